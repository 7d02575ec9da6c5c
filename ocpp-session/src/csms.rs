//! CSMS application logic
//!
//! Decides the fate of boot registrations and records connector status
//! reports. The decision flow: stations with a malformed identity are
//! rejected outright, stations an operator has not provisioned are kept
//! pending at a long retry interval, everything else is accepted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use ocpp_rpc::{
    Action, BootNotificationRequest, BootNotificationResponse, ChargingStationInfo,
    RegistrationStatus, StatusInfo, StatusNotificationRequest, StatusNotificationResponse,
};

use crate::config::CsmsConfig;
use crate::routing::Router;

// Field limits in characters, from the OCPP 2.0.1 BootNotification schema.
const MODEL_MAX_LEN: usize = 20;
const VENDOR_MAX_LEN: usize = 50;

enum BootRejection {
    NotProvisioned,
    InvalidIdentity(&'static str),
}

/// Charging station management system shared by all connections
pub struct Csms {
    config: CsmsConfig,
}

impl Csms {
    pub fn new(config: CsmsConfig) -> Self {
        Self { config }
    }

    /// Build the action router for one admitted charge point
    pub fn router(self: &Arc<Self>, charge_point_id: &str) -> Router {
        let boot_csms = Arc::clone(self);
        let boot_id = charge_point_id.to_string();
        let status_csms = Arc::clone(self);
        let status_id = charge_point_id.to_string();
        Router::new()
            .on(Action::BootNotification, move |request| {
                let csms = Arc::clone(&boot_csms);
                let id = boot_id.clone();
                async move { csms.on_boot_notification(&id, request) }
            })
            .on(Action::StatusNotification, move |request| {
                let csms = Arc::clone(&status_csms);
                let id = status_id.clone();
                async move { csms.on_status_notification(&id, request) }
            })
    }

    fn on_boot_notification(
        &self,
        charge_point_id: &str,
        request: BootNotificationRequest,
    ) -> BootNotificationResponse {
        let station = &request.charging_station;
        match self.validate_station(charge_point_id, station) {
            Ok(()) => {
                info!(
                    "Charge point {} registered: {} {} ({:?})",
                    charge_point_id, station.vendor_name, station.model, request.reason
                );
                BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: self.config.accepted_interval,
                    status: RegistrationStatus::Accepted,
                    status_info: None,
                }
            }
            Err(BootRejection::NotProvisioned) => {
                warn!(
                    "Charge point {} is not provisioned, keeping it pending",
                    charge_point_id
                );
                BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: self.config.pending_interval,
                    status: RegistrationStatus::Pending,
                    status_info: Some(StatusInfo {
                        reason_code: "NotProvisioned".to_string(),
                        additional_info: None,
                    }),
                }
            }
            Err(BootRejection::InvalidIdentity(detail)) => {
                warn!("Charge point {} rejected: {}", charge_point_id, detail);
                BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: self.config.rejected_interval,
                    status: RegistrationStatus::Rejected,
                    status_info: Some(StatusInfo {
                        reason_code: "InvalidIdentity".to_string(),
                        additional_info: Some(detail.to_string()),
                    }),
                }
            }
        }
    }

    fn on_status_notification(
        &self,
        charge_point_id: &str,
        request: StatusNotificationRequest,
    ) -> StatusNotificationResponse {
        info!(
            "Charge point {} reports {:?} on EVSE {} connector {}",
            charge_point_id, request.connector_status, request.evse_id, request.connector_id
        );
        StatusNotificationResponse {}
    }

    fn validate_station(
        &self,
        charge_point_id: &str,
        station: &ChargingStationInfo,
    ) -> Result<(), BootRejection> {
        if station.model.is_empty() || station.model.chars().count() > MODEL_MAX_LEN {
            return Err(BootRejection::InvalidIdentity(
                "model must be 1 to 20 characters",
            ));
        }
        if station.vendor_name.is_empty() || station.vendor_name.chars().count() > VENDOR_MAX_LEN
        {
            return Err(BootRejection::InvalidIdentity(
                "vendorName must be 1 to 50 characters",
            ));
        }
        if !self
            .config
            .provisioned_stations
            .iter()
            .any(|provisioned| provisioned == charge_point_id)
        {
            return Err(BootRejection::NotProvisioned);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_rpc::{BootReason, Call, ConnectorStatus, RpcFrame};
    use serde_json::json;

    fn csms() -> Csms {
        Csms::new(CsmsConfig::default())
    }

    fn boot_request(model: &str, vendor: &str) -> BootNotificationRequest {
        BootNotificationRequest {
            charging_station: ChargingStationInfo {
                model: model.to_string(),
                vendor_name: vendor.to_string(),
                serial_number: None,
                firmware_version: None,
            },
            reason: BootReason::PowerUp,
        }
    }

    #[test]
    fn test_provisioned_station_accepted() {
        let response = csms().on_boot_notification("CP_01", boot_request("22KW EC Charge", "EnBW"));
        assert_eq!(response.status, RegistrationStatus::Accepted);
        assert_eq!(response.interval, 10);
        assert!(response.status_info.is_none());
    }

    #[test]
    fn test_unprovisioned_station_kept_pending() {
        let response = csms().on_boot_notification("CP_99", boot_request("22KW EC Charge", "EnBW"));
        assert_eq!(response.status, RegistrationStatus::Pending);
        assert_eq!(response.interval, 120);
        let info = response.status_info.unwrap();
        assert_eq!(info.reason_code, "NotProvisioned");
    }

    #[test]
    fn test_oversized_model_rejected() {
        let response =
            csms().on_boot_notification("CP_01", boot_request(&"x".repeat(21), "EnBW"));
        assert_eq!(response.status, RegistrationStatus::Rejected);
        assert_eq!(response.interval, 60);
        let info = response.status_info.unwrap();
        assert_eq!(info.reason_code, "InvalidIdentity");
    }

    #[test]
    fn test_empty_vendor_rejected() {
        let response = csms().on_boot_notification("CP_01", boot_request("22KW EC Charge", ""));
        assert_eq!(response.status, RegistrationStatus::Rejected);
    }

    #[test]
    fn test_model_limit_counts_characters_not_bytes() {
        // 12 characters, 24 bytes; the schema limit is 20 characters.
        let model = "Ø".repeat(12);
        let response = csms().on_boot_notification("CP_01", boot_request(&model, "EnBW"));
        assert_eq!(response.status, RegistrationStatus::Accepted);
    }

    #[test]
    fn test_identity_checked_before_provisioning() {
        // Both problems at once: the identity failure must win.
        let response = csms().on_boot_notification("CP_99", boot_request("", "EnBW"));
        assert_eq!(response.status, RegistrationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_router_acks_status_notification() {
        let csms = Arc::new(csms());
        let router = csms.router("CP_01");
        let request = StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status: ConnectorStatus::Available,
            evse_id: 3,
            connector_id: 1001,
        };
        let call = Call::new(Action::StatusNotification, request).unwrap();
        let message_id = call.message_id.clone();

        match router.dispatch(call).await {
            RpcFrame::CallResult(result) => {
                assert_eq!(result.message_id, message_id);
                assert_eq!(result.payload, json!({}));
            }
            other => panic!("expected a call result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_router_dispatches_boot_notification() {
        let csms = Arc::new(csms());
        let router = csms.router("CP_01");
        let call = Call::new(Action::BootNotification, boot_request("22KW EC Charge", "EnBW"))
            .unwrap();
        let message_id = call.message_id.clone();

        match router.dispatch(call).await {
            RpcFrame::CallResult(result) => {
                assert_eq!(result.message_id, message_id);
                assert_eq!(result.payload["status"], json!("Accepted"));
                assert_eq!(result.payload["interval"], json!(10));
            }
            other => panic!("expected a call result, got {:?}", other),
        }
    }
}
