//! Outbound connection establishment
//!
//! Builds the HTTP upgrade request a charge point presents to the CSMS:
//! Basic-auth credentials plus the list of OCPP subprotocols it speaks. A
//! rejected handshake surfaces as `tungstenite::Error::Http` carrying the
//! server's status and reason body.

use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use crate::config::{Credentials, Settings};
use crate::error::SessionError;
use crate::negotiate::basic_auth_header;
use crate::session::WsStream;

/// Open a WebSocket to the CSMS for the given charge point.
///
/// The returned stream has completed the upgrade; the server has already
/// accepted the credentials and picked a subprotocol.
pub async fn connect(
    settings: &Settings,
    credentials: &Credentials,
    charge_point_id: &str,
) -> Result<WsStream, SessionError> {
    let url = settings.station_url(charge_point_id);
    info!("Connecting to CSMS at {}", url);

    let mut request = url.into_client_request().map_err(SessionError::Transport)?;
    // Bare commas: the client handshake checks the server's selection
    // against this header split on ',' without trimming.
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        header_value(settings.ocpp_subprotocols.join(","))?,
    );
    request
        .headers_mut()
        .insert(AUTHORIZATION, header_value(basic_auth_header(credentials))?);

    let (stream, response) = connect_async(request).await?;

    match response.headers().get(SEC_WEBSOCKET_PROTOCOL) {
        Some(selected) => debug!("Server selected subprotocol {:?}", selected),
        None => warn!("Server accepted the connection without selecting a subprotocol"),
    }
    Ok(stream)
}

fn header_value(text: String) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(&text)
        .map_err(http::Error::from)
        .map_err(tokio_tungstenite::tungstenite::Error::from)
        .map_err(SessionError::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_accepts_subprotocol_list() {
        let value = header_value("ocpp2.0.1,ocpp1.6".to_string()).unwrap();
        assert_eq!(value.to_str().unwrap(), "ocpp2.0.1,ocpp1.6");
    }

    #[test]
    fn test_header_value_rejects_control_characters() {
        assert!(header_value("bad\nheader".to_string()).is_err());
    }
}
