//! Session-level error taxonomy
//!
//! Negotiation rejections are not errors: they are `NegotiationResult`
//! values and never cross the handshake boundary. Everything that can go
//! wrong after a session exists is a `SessionError`, propagated up to the
//! supervisor, which is the single place that logs and tears down.

use ocpp_rpc::RpcError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by a session to its supervisor
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("connection closed before a response arrived")]
    NoResponse,

    #[error("call cancelled by session teardown")]
    Cancelled,

    #[error("timed out waiting for a call result")]
    Timeout,

    #[error("message id {0} already has a call in flight")]
    DuplicateMessageId(String),
}
