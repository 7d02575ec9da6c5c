//! CSMS WebSocket server
//!
//! Accepts TCP connections and runs connection negotiation inside the
//! WebSocket handshake callback, so a rejected station receives a plain
//! HTTP error response and never gets an upgraded socket. Each admitted
//! connection is handed to its own task running a supervised session.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::{accept_hdr_async, MaybeTlsStream};
use tracing::{debug, info};

use crate::config::{Credentials, Settings};
use crate::csms::Csms;
use crate::negotiate::{negotiate, ConnectionRequest, NegotiationResult};
use crate::session::Session;
use crate::supervisor::Supervisor;

/// Listening CSMS endpoint
pub struct CsmsServer {
    listener: TcpListener,
    settings: Settings,
    credentials: Credentials,
    csms: Arc<Csms>,
}

impl CsmsServer {
    pub async fn bind(
        settings: Settings,
        credentials: Credentials,
        csms: Arc<Csms>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(settings.bind_addr()).await?;
        Ok(Self {
            listener,
            settings,
            credentials,
            csms,
        })
    }

    /// The address actually bound, useful when the port was 0
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> io::Result<()> {
        info!("CSMS listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("Connection attempt from {}", peer);
            tokio::spawn(handle_connection(
                stream,
                self.settings.clone(),
                self.credentials.clone(),
                Arc::clone(&self.csms),
            ));
        }
    }
}

/// Negotiate one inbound connection and run its session to completion
async fn handle_connection(
    stream: TcpStream,
    settings: Settings,
    credentials: Credentials,
    csms: Arc<Csms>,
) {
    let mut admitted: Option<(String, String)> = None;

    let callback = |request: &Request, mut response: Response| {
        let connection = ConnectionRequest::from_upgrade(request);
        match negotiate(&connection, &credentials, &settings.ocpp_subprotocols) {
            NegotiationResult::Accepted { subprotocol } => {
                match HeaderValue::from_str(&subprotocol) {
                    Ok(value) => {
                        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                        admitted = Some((connection.charge_point_id, subprotocol));
                        Ok(response)
                    }
                    Err(_) => Err(reject_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Invalid subprotocol configuration.",
                    )),
                }
            }
            NegotiationResult::Rejected { status, reason } => {
                Err(reject_response(status, &reason))
            }
        }
    };

    let ws = match accept_hdr_async(MaybeTlsStream::Plain(stream), callback).await {
        Ok(ws) => ws,
        Err(e) => {
            // Refusals were already logged with their reason inside the
            // callback; this also covers plain HTTP requests that never
            // attempt an upgrade.
            debug!("Handshake did not complete: {}", e);
            return;
        }
    };

    let (charge_point_id, subprotocol) = match admitted {
        Some(admitted) => admitted,
        None => return,
    };
    info!("Charge point {} connected ({})", charge_point_id, subprotocol);

    let router = csms.router(&charge_point_id);
    let session = Session::new(ws, charge_point_id, router, settings.call_timeout);
    Supervisor::new(session).run_csms().await;
}

fn reject_response(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
