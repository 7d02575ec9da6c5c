//! # OCPP Session Layer
//!
//! Bidirectional OCPP 2.0.1 session layer between a charging station and a
//! CSMS over a persistent WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐                      ┌──────────────────────┐
//! │  ocpp-station    │   WebSocket OCPP-J   │  ocpp-csms           │
//! │  Station         │◄────────────────────►│  CsmsServer          │
//! │  Supervisor      │   Basic auth +       │  negotiate()         │
//! │  Session ──call──│   subprotocol        │──Session ── Router   │
//! └──────────────────┘   negotiation        └──────────────────────┘
//! ```
//!
//! Both endpoints speak through the same [`Session`]: it multiplexes
//! concurrent calls by correlation id, answers inbound calls through a
//! [`Router`], and tears down idempotently. The server side admits
//! connections via [`negotiate`] inside the WebSocket handshake; a rejected
//! station gets an HTTP error and no session is ever built for it.

pub mod config;
pub mod connect;
pub mod csms;
pub mod error;
pub mod negotiate;
pub mod routing;
pub mod server;
pub mod session;
pub mod station;
pub mod supervisor;

pub use config::{Credentials, CsmsConfig, LogFormat, Settings, StationConfig};
pub use connect::connect;
pub use csms::Csms;
pub use error::SessionError;
pub use negotiate::{basic_auth_header, negotiate, ConnectionRequest, NegotiationResult};
pub use routing::Router;
pub use server::CsmsServer;
pub use session::{Session, SessionPhase, WsStream};
pub use station::Station;
pub use supervisor::Supervisor;
