//! Connection admission
//!
//! Validates the HTTP upgrade request of an incoming station connection
//! before any session exists: Basic-auth credentials first, then WebSocket
//! subprotocol compatibility. Checks run in a fixed order and the first
//! failure wins; a rejection carries the HTTP status and reason text the
//! handshake response uses. No session is ever constructed for a rejection.

use base64::prelude::*;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info};

use crate::config::Credentials;

/// One inbound connection attempt, as seen at the HTTP upgrade
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    /// Charge point id taken from the URL path
    pub charge_point_id: String,

    /// Raw Authorization header, when present
    pub authorization: Option<String>,

    /// Requested subprotocols in client order, when the header was present
    pub subprotocols: Option<Vec<String>>,
}

impl ConnectionRequest {
    pub fn new(path: &str, authorization: Option<&str>, protocols: Option<&str>) -> Self {
        Self {
            charge_point_id: path.trim_matches('/').to_string(),
            authorization: authorization.map(str::to_string),
            subprotocols: protocols.map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }

    /// Capture the negotiation-relevant parts of an HTTP upgrade request
    pub fn from_upgrade(request: &http::Request<()>) -> Self {
        let header_text = |name| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };
        Self::new(
            request.uri().path(),
            header_text(AUTHORIZATION),
            header_text(SEC_WEBSOCKET_PROTOCOL),
        )
    }
}

/// Outcome of connection negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationResult {
    Accepted { subprotocol: String },
    Rejected { status: StatusCode, reason: String },
}

/// Decide whether to admit a connection.
///
/// Order: Authorization present, credentials match, subprotocol list
/// present, subprotocol intersection non-empty. The selected subprotocol is
/// the first supported one the client also offers. Every rejection is
/// logged with its reason; closing the connection is the caller's job.
pub fn negotiate(
    request: &ConnectionRequest,
    expected: &Credentials,
    supported: &[String],
) -> NegotiationResult {
    let authorization = match &request.authorization {
        Some(header) => header,
        None => return rejected(StatusCode::UNAUTHORIZED, "Access denied."),
    };

    // A header that cannot be decoded counts as a credential mismatch.
    match decode_basic(authorization) {
        Some(given) if given == *expected => {}
        _ => return rejected(StatusCode::FORBIDDEN, "Invalid Username/Password."),
    }

    let requested = match &request.subprotocols {
        Some(list) => list,
        None => return rejected(StatusCode::BAD_REQUEST, "Subprotocol missing."),
    };

    match supported.iter().find(|name| requested.contains(name)) {
        Some(subprotocol) => {
            info!("Protocols Matched: {}", subprotocol);
            NegotiationResult::Accepted {
                subprotocol: subprotocol.clone(),
            }
        }
        None => rejected(
            StatusCode::BAD_REQUEST,
            format!(
                "Protocols Mismatched, expected Subprotocols {:?}, but received {:?}.",
                supported, requested
            ),
        ),
    }
}

fn rejected(status: StatusCode, reason: impl Into<String>) -> NegotiationResult {
    let reason = reason.into();
    error!("{} - Connection closed.", reason);
    NegotiationResult::Rejected { status, reason }
}

/// Encode a Basic Authorization header value
pub fn basic_auth_header(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.username, credentials.password);
    format!("Basic {}", BASE64_STANDARD.encode(pair))
}

/// Decode a Basic Authorization header; None if scheme or payload is off
fn decode_basic(header: &str) -> Option<Credentials> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some(Credentials::new(username, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Credentials {
        Credentials::new("test", "123")
    }

    fn supported() -> Vec<String> {
        vec!["ocpp2.0.1".to_string()]
    }

    fn authorized() -> String {
        basic_auth_header(&expected())
    }

    #[test]
    fn test_missing_authorization_rejected() {
        let request = ConnectionRequest::new("/CP_01", None, Some("ocpp2.0.1"));
        let result = negotiate(&request, &expected(), &supported());
        assert_eq!(
            result,
            NegotiationResult::Rejected {
                status: StatusCode::UNAUTHORIZED,
                reason: "Access denied.".to_string(),
            }
        );
    }

    #[test]
    fn test_wrong_password_rejected() {
        let header = basic_auth_header(&Credentials::new("test", "wrong"));
        let request = ConnectionRequest::new("/CP_01", Some(&header), Some("ocpp2.0.1"));
        let result = negotiate(&request, &expected(), &supported());
        assert_eq!(
            result,
            NegotiationResult::Rejected {
                status: StatusCode::FORBIDDEN,
                reason: "Invalid Username/Password.".to_string(),
            }
        );
    }

    #[test]
    fn test_undecodable_authorization_rejected() {
        for header in ["Bearer abc123", "Basic !!!not-base64!!!", "Basic"] {
            let request = ConnectionRequest::new("/CP_01", Some(header), Some("ocpp2.0.1"));
            match negotiate(&request, &expected(), &supported()) {
                NegotiationResult::Rejected { status, .. } => {
                    assert_eq!(status, StatusCode::FORBIDDEN)
                }
                other => panic!("expected rejection, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_credentials_checked_before_subprotocols() {
        // Both checks would fail; the credential one must win.
        let header = basic_auth_header(&Credentials::new("test", "wrong"));
        let request = ConnectionRequest::new("/CP_01", Some(&header), None);
        match negotiate(&request, &expected(), &supported()) {
            NegotiationResult::Rejected { status, .. } => {
                assert_eq!(status, StatusCode::FORBIDDEN)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_subprotocol_rejected() {
        let header = authorized();
        let request = ConnectionRequest::new("/CP_01", Some(&header), None);
        let result = negotiate(&request, &expected(), &supported());
        assert_eq!(
            result,
            NegotiationResult::Rejected {
                status: StatusCode::BAD_REQUEST,
                reason: "Subprotocol missing.".to_string(),
            }
        );
    }

    #[test]
    fn test_mismatched_subprotocols_rejected() {
        let header = authorized();
        let request = ConnectionRequest::new("/CP_01", Some(&header), Some("ocpp1.6"));
        match negotiate(&request, &expected(), &supported()) {
            NegotiationResult::Rejected { status, reason } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(reason.contains("ocpp2.0.1"));
                assert!(reason.contains("ocpp1.6"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_first_supported_match_wins() {
        let header = authorized();
        let request = ConnectionRequest::new("/CP_01", Some(&header), Some("ocpp1.6, ocpp2.0.1"));
        let result = negotiate(&request, &expected(), &supported());
        assert_eq!(
            result,
            NegotiationResult::Accepted {
                subprotocol: "ocpp2.0.1".to_string(),
            }
        );
    }

    #[test]
    fn test_selection_follows_supported_order() {
        let header = authorized();
        let supported = vec!["ocpp2.0.1".to_string(), "ocpp1.6".to_string()];
        let request = ConnectionRequest::new("/CP_01", Some(&header), Some("ocpp1.6, ocpp2.0.1"));
        let result = negotiate(&request, &expected(), &supported);
        assert_eq!(
            result,
            NegotiationResult::Accepted {
                subprotocol: "ocpp2.0.1".to_string(),
            }
        );
    }

    #[test]
    fn test_path_becomes_charge_point_id() {
        let request = ConnectionRequest::new("/CP_01", None, None);
        assert_eq!(request.charge_point_id, "CP_01");
    }

    #[test]
    fn test_basic_auth_round_trip() {
        let credentials = Credentials::new("test", "123");
        let decoded = decode_basic(&basic_auth_header(&credentials));
        assert_eq!(decoded, Some(credentials));
    }
}
