//! # OCPP RPC codec
//!
//! Wire framing and payload types for an OCPP 2.0.1 session layer:
//! - `frame`: JSON array framing (CALL, CALLRESULT, CALLERROR) and action names
//! - `types`: payloads for the boot and status notification exchanges

pub mod frame;
pub mod types;

pub use frame::{Action, Call, CallError, CallResult, ErrorCode, MessageType, RpcError, RpcFrame};
pub use types::*;
