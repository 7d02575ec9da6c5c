//! Charge point application logic
//!
//! The behavior a station performs once its session is open: register via
//! BootNotification, log the CSMS verdict, then report connector state with
//! a fire-and-forget StatusNotification. The registration status is only
//! observed here; gating further traffic on it belongs to a fuller station
//! implementation.

use chrono::Utc;
use tracing::{info, warn};

use ocpp_rpc::{
    Action, BootNotificationRequest, BootNotificationResponse, BootReason, ChargingStationInfo,
    ConnectorStatus, RegistrationStatus, StatusNotificationRequest,
};

use crate::config::StationConfig;
use crate::error::SessionError;
use crate::session::Session;

/// One charge point identity and its startup behavior
pub struct Station {
    config: StationConfig,
}

impl Station {
    pub fn new(config: StationConfig) -> Self {
        Self { config }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.config.charge_point_id
    }

    fn identity(&self) -> ChargingStationInfo {
        ChargingStationInfo {
            model: self.config.model.clone(),
            vendor_name: self.config.vendor_name.clone(),
            serial_number: self.config.serial_number.clone(),
            firmware_version: self.config.firmware_version.clone(),
        }
    }

    /// Register with the CSMS and log its verdict
    pub async fn send_boot_notification(
        &self,
        session: &Session,
    ) -> Result<BootNotificationResponse, SessionError> {
        let request = BootNotificationRequest {
            charging_station: self.identity(),
            reason: BootReason::PowerUp,
        };
        let response: BootNotificationResponse =
            session.call(Action::BootNotification, &request).await?;

        match response.status {
            RegistrationStatus::Accepted => info!("Boot notification acknowledged!"),
            RegistrationStatus::Pending => info!("Boot notification pending!"),
            RegistrationStatus::Rejected => warn!("Boot notification rejected!"),
        }
        Ok(response)
    }

    /// Report the connector as available; the acknowledgement is not awaited
    pub async fn send_status_notification(&self, session: &Session) -> Result<(), SessionError> {
        let request = StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status: ConnectorStatus::Available,
            evse_id: self.config.evse_id,
            connector_id: self.config.connector_id,
        };
        session.notify(Action::StatusNotification, &request).await
    }

    /// The startup sequence: register, then report connector state
    pub async fn run(&self, session: &Session) -> Result<BootNotificationResponse, SessionError> {
        let response = self.send_boot_notification(session).await?;
        self.send_status_notification(session).await?;
        Ok(response)
    }
}
