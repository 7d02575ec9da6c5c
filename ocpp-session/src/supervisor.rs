//! Session supervision
//!
//! The supervisor is the single owner of a session's lifecycle: it starts
//! the read task, runs the role logic, classifies whatever error comes out
//! of it, and guarantees `cancel_all` runs on every exit path. Nothing
//! below the supervisor swallows an error; nothing above it needs to clean
//! up.

use tracing::{debug, error, warn};

use ocpp_rpc::BootNotificationResponse;

use crate::config::{Credentials, Settings};
use crate::connect::connect;
use crate::error::SessionError;
use crate::routing::Router;
use crate::session::Session;
use crate::station::Station;

/// Drives exactly one session from construction to teardown
pub struct Supervisor {
    session: Session,
}

impl Supervisor {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connect to the CSMS and run the station sequence over one session.
    ///
    /// Handshake rejections never produce a session; they are logged here
    /// and returned as transport errors.
    pub async fn run_station(
        settings: &Settings,
        credentials: &Credentials,
        station: &Station,
    ) -> Result<BootNotificationResponse, SessionError> {
        let stream = match connect(settings, credentials, station.charge_point_id()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    "Connection refused from Server. Make sure you entered the correct credentials."
                );
                debug!("Connect failed: {}", e);
                return Err(e);
            }
        };

        let session = Session::new(
            stream,
            station.charge_point_id(),
            Router::new(),
            settings.call_timeout,
        );
        Supervisor::new(session).drive_station(station).await
    }

    async fn drive_station(
        &self,
        station: &Station,
    ) -> Result<BootNotificationResponse, SessionError> {
        self.session.start().await;
        let result = station.run(&self.session).await;
        match &result {
            Ok(response) => debug!("Station sequence finished: {:?}", response.status),
            Err(e) => log_station_error(e),
        }
        self.session.cancel_all().await;
        result
    }

    /// Drive an admitted CSMS-side session until the connection ends
    pub async fn run_csms(&self) {
        self.session.start().await;
        self.session.closed().await;

        let reason = self
            .session
            .close_reason()
            .await
            .unwrap_or_else(|| "connection closed".to_string());
        warn!(
            "Connection to charge point {} closed: {}",
            self.session.charge_point_id(),
            reason
        );
        self.session.cancel_all().await;
    }
}

fn log_station_error(error: &SessionError) {
    match error {
        SessionError::NoResponse => error!("Unknown error happened on server."),
        SessionError::Cancelled => debug!("Call cancelled during teardown"),
        SessionError::Transport(e) => error!("Connection error: {}", e),
        other => error!("Session failed: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;

    #[tokio::test]
    async fn test_run_station_surfaces_connect_failure() {
        // Bind then drop to find a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = Settings::default().with_port(port);
        let station = Station::new(StationConfig::default());
        let result =
            Supervisor::run_station(&settings, &Credentials::new("test", "123"), &station).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }
}
