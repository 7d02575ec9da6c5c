//! OCPP 2.0.1 RPC framing
//!
//! OCPP-J exchanges three frame shapes as JSON arrays inside WebSocket text
//! messages:
//! - CALL:       [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR:  [4, messageId, errorCode, errorDescription, errorDetails]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Message type identifiers on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

/// Actions spoken by this session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    BootNotification,
    StatusNotification,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for Action {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BootNotification" => Ok(Action::BootNotification),
            "StatusNotification" => Ok(Action::StatusNotification),
            _ => Err(RpcError::UnknownAction(s.to_string())),
        }
    }
}

/// RPC framework error codes defined by OCPP 2.0.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FormatViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

/// Errors raised while building or parsing RPC frames
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed RPC frame: {0}")]
    InvalidFrame(&'static str),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown message type id: {0}")]
    UnknownMessageType(i64),

    #[error("peer reported {code:?}: {description}")]
    RemoteError {
        code: ErrorCode,
        description: String,
        details: Value,
    },
}

/// CALL frame (request)
///
/// The action is kept as the raw wire string so that a frame naming an
/// action this endpoint does not speak can still be answered with a
/// NotImplemented CALLERROR instead of failing the whole frame.
#[derive(Debug, Clone)]
pub struct Call {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
}

impl Call {
    /// Build a CALL with a fresh UUID v4 correlation id
    pub fn new(action: Action, payload: impl Serialize) -> Result<Self, RpcError> {
        Ok(Self {
            message_id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to wire format: [2, messageId, action, payload]
    pub fn to_text(&self) -> Result<String, RpcError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.message_id,
            &self.action,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// CALLRESULT frame (success response)
#[derive(Debug, Clone)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    /// Build a CALLRESULT echoing the correlation id of the request
    pub fn new(message_id: impl Into<String>, payload: impl Serialize) -> Result<Self, RpcError> {
        Ok(Self {
            message_id: message_id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload as a concrete response type
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, RpcError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize to wire format: [3, messageId, payload]
    pub fn to_text(&self) -> Result<String, RpcError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.message_id,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// CALLERROR frame (error response)
#[derive(Debug, Clone)]
pub struct CallError {
    pub message_id: String,
    pub code: ErrorCode,
    pub description: String,
    pub details: Value,
}

impl CallError {
    pub fn new(
        message_id: impl Into<String>,
        code: ErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            code,
            description: description.into(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// CALLERROR for an action this endpoint has no handler for
    pub fn not_implemented(message_id: impl Into<String>, action: &str) -> Self {
        Self::new(
            message_id,
            ErrorCode::NotImplemented,
            format!("no handler for action {}", action),
        )
    }

    /// CALLERROR for a payload that did not match the action's schema
    pub fn format_violation(message_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message_id, ErrorCode::FormatViolation, detail)
    }

    /// CALLERROR for a handler that failed internally
    pub fn internal_error(message_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message_id, ErrorCode::InternalError, detail)
    }

    /// The error a caller awaiting this correlation id should observe
    pub fn into_remote_error(self) -> RpcError {
        RpcError::RemoteError {
            code: self.code,
            description: self.description,
            details: self.details,
        }
    }

    /// Serialize to wire format: [4, messageId, errorCode, errorDescription, errorDetails]
    pub fn to_text(&self) -> Result<String, RpcError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.message_id,
            format!("{:?}", self.code),
            &self.description,
            &self.details
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// Any parsed RPC frame
#[derive(Debug, Clone)]
pub enum RpcFrame {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl RpcFrame {
    /// Parse a frame from WebSocket text
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let array: Vec<Value> = serde_json::from_str(text)?;

        let type_id = array
            .first()
            .and_then(Value::as_i64)
            .ok_or(RpcError::InvalidFrame("missing message type id"))?;

        match type_id {
            2 => {
                if array.len() != 4 {
                    return Err(RpcError::InvalidFrame("CALL must have 4 elements"));
                }
                Ok(RpcFrame::Call(Call {
                    message_id: string_at(&array, 1, "CALL message id")?,
                    action: string_at(&array, 2, "CALL action")?,
                    payload: array[3].clone(),
                }))
            }
            3 => {
                if array.len() != 3 {
                    return Err(RpcError::InvalidFrame("CALLRESULT must have 3 elements"));
                }
                Ok(RpcFrame::CallResult(CallResult {
                    message_id: string_at(&array, 1, "CALLRESULT message id")?,
                    payload: array[2].clone(),
                }))
            }
            4 => {
                if array.len() != 5 {
                    return Err(RpcError::InvalidFrame("CALLERROR must have 5 elements"));
                }
                let code_text = string_at(&array, 2, "CALLERROR code")?;
                // Unknown codes from a peer degrade to GenericError rather
                // than failing the frame.
                let code = serde_json::from_value(Value::String(code_text))
                    .unwrap_or(ErrorCode::GenericError);
                Ok(RpcFrame::CallError(CallError {
                    message_id: string_at(&array, 1, "CALLERROR message id")?,
                    code,
                    description: array[3].as_str().unwrap_or("").to_string(),
                    details: array[4].clone(),
                }))
            }
            other => Err(RpcError::UnknownMessageType(other)),
        }
    }

    /// The correlation id carried by this frame
    pub fn message_id(&self) -> &str {
        match self {
            RpcFrame::Call(c) => &c.message_id,
            RpcFrame::CallResult(r) => &r.message_id,
            RpcFrame::CallError(e) => &e.message_id,
        }
    }

    pub fn to_text(&self) -> Result<String, RpcError> {
        match self {
            RpcFrame::Call(c) => c.to_text(),
            RpcFrame::CallResult(r) => r.to_text(),
            RpcFrame::CallError(e) => e.to_text(),
        }
    }
}

fn string_at(array: &[Value], index: usize, what: &'static str) -> Result<String, RpcError> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(RpcError::InvalidFrame(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    #[test]
    fn test_call_serialization() {
        let call = Call::new(
            Action::StatusNotification,
            StatusNotificationRequest {
                timestamp: chrono::Utc::now(),
                connector_status: ConnectorStatus::Available,
                evse_id: 3,
                connector_id: 1001,
            },
        )
        .unwrap();
        let text = call.to_text().unwrap();

        assert!(text.starts_with("[2,"));
        assert!(text.contains("\"StatusNotification\""));
        assert!(text.contains("\"connectorStatus\":\"Available\""));
    }

    #[test]
    fn test_call_parsing() {
        let json = r#"[2, "msg-123", "BootNotification", {"reason": "PowerUp"}]"#;
        let frame = RpcFrame::parse(json).unwrap();

        match frame {
            RpcFrame::Call(call) => {
                assert_eq!(call.message_id, "msg-123");
                assert_eq!(call.action.parse::<Action>().unwrap(), Action::BootNotification);
            }
            _ => panic!("Expected Call"),
        }
    }

    #[test]
    fn test_unknown_action_is_preserved() {
        let json = r#"[2, "msg-9", "Heartbeat", {}]"#;
        let frame = RpcFrame::parse(json).unwrap();

        match frame {
            RpcFrame::Call(call) => {
                assert_eq!(call.action, "Heartbeat");
                assert!(call.action.parse::<Action>().is_err());
            }
            _ => panic!("Expected Call"),
        }
    }

    #[test]
    fn test_call_result_parsing() {
        let json = r#"[3, "msg-123", {"currentTime": "2026-01-20T12:00:00Z", "interval": 10, "status": "Accepted"}]"#;
        let frame = RpcFrame::parse(json).unwrap();

        match frame {
            RpcFrame::CallResult(result) => {
                assert_eq!(result.message_id, "msg-123");
                let response: BootNotificationResponse = result.decode().unwrap();
                assert_eq!(response.interval, 10);
                assert_eq!(response.status, RegistrationStatus::Accepted);
            }
            _ => panic!("Expected CallResult"),
        }
    }

    #[test]
    fn test_call_error_parsing() {
        let json = r#"[4, "msg-123", "NotImplemented", "no handler", {}]"#;
        let frame = RpcFrame::parse(json).unwrap();

        match frame {
            RpcFrame::CallError(error) => {
                assert_eq!(error.message_id, "msg-123");
                assert_eq!(error.code, ErrorCode::NotImplemented);
            }
            _ => panic!("Expected CallError"),
        }
    }

    #[test]
    fn test_unknown_error_code_degrades() {
        let json = r#"[4, "msg-1", "SomethingNew", "detail", {}]"#;
        let frame = RpcFrame::parse(json).unwrap();

        match frame {
            RpcFrame::CallError(error) => assert_eq!(error.code, ErrorCode::GenericError),
            _ => panic!("Expected CallError"),
        }
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(matches!(
            RpcFrame::parse(r#"[2, "msg-1", "BootNotification"]"#),
            Err(RpcError::InvalidFrame(_))
        ));
        assert!(matches!(
            RpcFrame::parse(r#"[3, "msg-1"]"#),
            Err(RpcError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(matches!(
            RpcFrame::parse(r#"[9, "msg-1", {}]"#),
            Err(RpcError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_call_error_round_trip() {
        let error = CallError::not_implemented("msg-7", "MeterValues");
        let text = error.to_text().unwrap();
        assert!(text.starts_with("[4,"));

        match RpcFrame::parse(&text).unwrap() {
            RpcFrame::CallError(parsed) => {
                assert_eq!(parsed.message_id, "msg-7");
                assert_eq!(parsed.code, ErrorCode::NotImplemented);
            }
            _ => panic!("Expected CallError"),
        }
    }
}
