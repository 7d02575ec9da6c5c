//! Configuration for the OCPP session layer
//!
//! One static settings object per process, read once at startup. There is
//! no hot-reload.

use std::time::Duration;

/// Network and logging settings shared by both roles
#[derive(Debug, Clone)]
pub struct Settings {
    /// Host the CSMS binds and the station dials
    pub websocket_host: String,

    /// TCP port of the CSMS WebSocket endpoint
    pub websocket_port: u16,

    /// Subprotocols offered and accepted, in preference order
    pub ocpp_subprotocols: Vec<String>,

    /// Log level name (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log line format
    pub log_format: LogFormat,

    /// How long a call waits for its result
    pub call_timeout: Duration,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            websocket_host: "127.0.0.1".to_string(),
            websocket_port: 6000,
            ocpp_subprotocols: vec!["ocpp2.0.1".to_string()],
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// WebSocket URL a station uses to connect as `charge_point_id`
    pub fn station_url(&self, charge_point_id: &str) -> String {
        format!(
            "ws://{}:{}/{}",
            self.websocket_host, self.websocket_port, charge_point_id
        )
    }

    /// Address the server binds
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.websocket_host, self.websocket_port)
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.websocket_host = host.into();
        self
    }

    /// Set the port (0 picks an ephemeral port when binding)
    pub fn with_port(mut self, port: u16) -> Self {
        self.websocket_port = port;
        self
    }

    /// Replace the offered subprotocols
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.ocpp_subprotocols = subprotocols;
        self
    }

    /// Set the call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// A username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Fixed identity a charge point reports at boot
#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Charge point id; becomes the connection URL path
    pub charge_point_id: String,

    /// Model name for BootNotification
    pub model: String,

    /// Vendor name for BootNotification
    pub vendor_name: String,

    /// Serial number (optional)
    pub serial_number: Option<String>,

    /// Firmware version (optional)
    pub firmware_version: Option<String>,

    /// EVSE reported in status notifications
    pub evse_id: i32,

    /// Connector reported in status notifications
    pub connector_id: i32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            charge_point_id: "CP_01".to_string(),
            model: "22KW EC Charge".to_string(),
            vendor_name: "EnBW".to_string(),
            serial_number: None,
            firmware_version: None,
            evse_id: 3,
            connector_id: 1001,
        }
    }
}

impl StationConfig {
    /// Set the charge point id
    pub fn with_charge_point_id(mut self, id: impl Into<String>) -> Self {
        self.charge_point_id = id.into();
        self
    }

    /// Set vendor and model
    pub fn with_vendor(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor_name = vendor.into();
        self.model = model.into();
        self
    }
}

/// Registration decision parameters for the CSMS
#[derive(Debug, Clone)]
pub struct CsmsConfig {
    /// Re-registration interval handed to accepted stations (seconds)
    pub accepted_interval: i32,

    /// Retry interval for stations kept pending (seconds)
    pub pending_interval: i32,

    /// Retry interval for rejected stations (seconds)
    pub rejected_interval: i32,

    /// Station ids an operator has provisioned
    pub provisioned_stations: Vec<String>,
}

impl Default for CsmsConfig {
    fn default() -> Self {
        Self {
            accepted_interval: 10,
            pending_interval: 120,
            rejected_interval: 60,
            provisioned_stations: vec!["CP_01".to_string()],
        }
    }
}

impl CsmsConfig {
    /// Replace the provisioned-stations list
    pub fn with_provisioned(mut self, stations: Vec<String>) -> Self {
        self.provisioned_stations = stations;
        self
    }

    /// Provision one more station id
    pub fn with_station(mut self, id: impl Into<String>) -> Self {
        self.provisioned_stations.push(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.websocket_port, 6000);
        assert_eq!(settings.ocpp_subprotocols, vec!["ocpp2.0.1".to_string()]);
        assert_eq!(settings.station_url("CP_01"), "ws://127.0.0.1:6000/CP_01");
        assert_eq!(settings.bind_addr(), "127.0.0.1:6000");
    }

    #[test]
    fn test_settings_builder() {
        let settings = Settings::default()
            .with_host("0.0.0.0")
            .with_port(0)
            .with_call_timeout(Duration::from_secs(5));
        assert_eq!(settings.bind_addr(), "0.0.0.0:0");
        assert_eq!(settings.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_csms_config_builder() {
        let config = CsmsConfig::default().with_station("CP_02");
        assert_eq!(config.accepted_interval, 10);
        assert_eq!(config.pending_interval, 120);
        assert_eq!(config.rejected_interval, 60);
        assert!(config.provisioned_stations.contains(&"CP_02".to_string()));
    }
}
