//! OCPP session over an established WebSocket
//!
//! A `Session` owns one accepted connection and multiplexes concurrent
//! outbound calls over it. Each call registers a correlation id before its
//! frame is written; a background read task resolves ids as responses
//! arrive, so responses may come back in any order. Inbound calls from the
//! peer go through the session's `Router` and are answered on the same
//! socket. Teardown runs exactly once no matter how many paths reach it and
//! fails every in-flight call instead of leaving it hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use ocpp_rpc::{Action, Call, RpcError, RpcFrame};

use crate::error::SessionError;
use crate::routing::Router;

/// The WebSocket stream type shared by both endpoints
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Session lifecycle, observable through [`Session::closed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Open,
    Closing,
    Closed,
}

/// Why in-flight calls are being drained at teardown
#[derive(Clone, Copy)]
enum DrainReason {
    /// Local teardown via [`Session::cancel_all`]
    Cancelled,
    /// The connection went away before the response arrived
    NoResponse,
}

impl DrainReason {
    fn to_error(self) -> SessionError {
        match self {
            DrainReason::Cancelled => SessionError::Cancelled,
            DrainReason::NoResponse => SessionError::NoResponse,
        }
    }
}

/// What to do with an inbound response for a registered correlation id
enum PendingSlot {
    /// A caller is waiting on this id
    Deliver(oneshot::Sender<Result<Value, SessionError>>),
    /// Fire-and-forget call; drop the acknowledgement
    Ignore,
}

struct Shared {
    charge_point_id: String,
    sink: Mutex<WsSink>,
    pending: Mutex<HashMap<String, PendingSlot>>,
    cancelled: AtomicBool,
    phase_tx: watch::Sender<SessionPhase>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    close_reason: Mutex<Option<String>>,
}

/// One live OCPP connection between a charge point and the CSMS
pub struct Session {
    shared: Arc<Shared>,
    source: Mutex<Option<WsSource>>,
    router: Arc<Router>,
    call_timeout: Duration,
    phase_rx: watch::Receiver<SessionPhase>,
}

impl Session {
    pub fn new(
        stream: WsStream,
        charge_point_id: impl Into<String>,
        router: Router,
        call_timeout: Duration,
    ) -> Self {
        let (sink, source) = stream.split();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Open);
        Self {
            shared: Arc::new(Shared {
                charge_point_id: charge_point_id.into(),
                sink: Mutex::new(sink),
                pending: Mutex::new(HashMap::new()),
                cancelled: AtomicBool::new(false),
                phase_tx,
                read_task: Mutex::new(None),
                close_reason: Mutex::new(None),
            }),
            source: Mutex::new(Some(source)),
            router: Arc::new(router),
            call_timeout,
            phase_rx,
        }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.shared.charge_point_id
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase_rx.borrow()
    }

    /// Spawn the background read task. Calling twice is a no-op.
    pub async fn start(&self) {
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let source = match self.source.lock().await.take() {
            Some(source) => source,
            None => return,
        };
        let handle = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.router),
            source,
        ));
        *self.shared.read_task.lock().await = Some(handle);
    }

    /// Send a call and wait for the matching response.
    ///
    /// The correlation id is registered before the frame is written, so a
    /// response cannot outrun its waiter. Fails fast on a duplicate id, on
    /// teardown of the session, and after the configured call timeout.
    pub async fn call<Req, Resp>(&self, action: Action, request: &Req) -> Result<Resp, SessionError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let call = Call::new(action, request)?;
        let message_id = call.message_id.clone();

        let (tx, rx) = oneshot::channel();
        self.register(&message_id, PendingSlot::Deliver(tx)).await?;

        if let Err(e) = self.transmit(&RpcFrame::Call(call)).await {
            self.shared.pending.lock().await.remove(&message_id);
            return Err(e);
        }
        debug!("Call {} dispatched as {}", message_id, action);

        let payload = match timeout(self.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(SessionError::NoResponse),
            Err(_) => {
                self.shared.pending.lock().await.remove(&message_id);
                return Err(SessionError::Timeout);
            }
        };
        Ok(serde_json::from_value(payload).map_err(RpcError::from)?)
    }

    /// Send a call without waiting for its response.
    ///
    /// The id is still registered so the acknowledgement is recognized and
    /// discarded instead of being logged as an unknown response.
    pub async fn notify<Req>(&self, action: Action, request: &Req) -> Result<(), SessionError>
    where
        Req: Serialize,
    {
        let call = Call::new(action, request)?;
        let message_id = call.message_id.clone();

        self.register(&message_id, PendingSlot::Ignore).await?;

        if let Err(e) = self.transmit(&RpcFrame::Call(call)).await {
            self.shared.pending.lock().await.remove(&message_id);
            return Err(e);
        }
        debug!("Notification {} dispatched as {}", message_id, action);
        Ok(())
    }

    /// Tear the session down: abort the read task, fail every in-flight
    /// call with [`SessionError::Cancelled`] and close the socket. Safe to
    /// call any number of times; one invocation does the work and the rest
    /// return once the session has reached [`SessionPhase::Closed`].
    pub async fn cancel_all(&self) {
        if let Some(handle) = self.shared.read_task.lock().await.take() {
            handle.abort();
        }
        teardown(&self.shared, DrainReason::Cancelled).await;
    }

    /// Resolve once the session reaches [`SessionPhase::Closed`]
    pub async fn closed(&self) {
        let mut phase_rx = self.phase_rx.clone();
        loop {
            if *phase_rx.borrow_and_update() == SessionPhase::Closed {
                return;
            }
            if phase_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Why the connection ended, when the read task observed it
    pub async fn close_reason(&self) -> Option<String> {
        self.shared.close_reason.lock().await.clone()
    }

    /// Reserve a correlation id.
    ///
    /// The cancelled check happens under the pending lock, so a concurrent
    /// teardown either drains this slot or this registration observes the
    /// teardown and fails; a slot can never be silently orphaned.
    async fn register(&self, message_id: &str, slot: PendingSlot) -> Result<(), SessionError> {
        let mut pending = self.shared.pending.lock().await;
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return Err(SessionError::Cancelled);
        }
        if pending.contains_key(message_id) {
            return Err(SessionError::DuplicateMessageId(message_id.to_string()));
        }
        pending.insert(message_id.to_string(), slot);
        Ok(())
    }

    async fn transmit(&self, frame: &RpcFrame) -> Result<(), SessionError> {
        send_frame(&self.shared, frame).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut read_task) = self.shared.read_task.try_lock() {
            if let Some(handle) = read_task.take() {
                handle.abort();
            }
        }
    }
}

/// Run teardown exactly once: a caller that loses the swap waits for the
/// winning teardown to publish `Closed`, so the phase is terminal whenever
/// this function resolves.
async fn teardown(shared: &Arc<Shared>, reason: DrainReason) {
    if shared.cancelled.swap(true, Ordering::SeqCst) {
        let mut phase_rx = shared.phase_tx.subscribe();
        while *phase_rx.borrow_and_update() != SessionPhase::Closed {
            if phase_rx.changed().await.is_err() {
                return;
            }
        }
        return;
    }
    let _ = shared.phase_tx.send(SessionPhase::Closing);

    let drained: Vec<(String, PendingSlot)> = shared.pending.lock().await.drain().collect();
    for (message_id, slot) in drained {
        if let PendingSlot::Deliver(tx) = slot {
            debug!("Failing in-flight call {}", message_id);
            let _ = tx.send(Err(reason.to_error()));
        }
    }

    // Close errors are expected when the peer is already gone.
    let _ = shared.sink.lock().await.close().await;
    let _ = shared.phase_tx.send(SessionPhase::Closed);
}

/// Consume inbound frames until the connection ends, then tear down.
///
/// This task never aborts itself; [`Session::cancel_all`] aborts it from
/// outside, and the natural exit paths fall through to teardown below.
async fn read_loop(shared: Arc<Shared>, router: Arc<Router>, mut source: WsSource) {
    let mut reason: Option<String> = None;
    while let Some(next) = source.next().await {
        match next {
            Ok(Message::Text(text)) => handle_frame(&shared, &router, &text).await,
            Ok(Message::Close(_)) => {
                info!("Session {} received a close frame", shared.charge_point_id);
                reason = Some("peer closed the connection".to_string());
                break;
            }
            // Ping and Pong are answered by the transport layer.
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                reason = Some(format!("transport error: {}", e));
                break;
            }
        }
    }

    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
    *shared.close_reason.lock().await = Some(reason);

    // Teardown gets its own task: an abort aimed at this read task must
    // not be able to cut the drain short.
    tokio::spawn(async move { teardown(&shared, DrainReason::NoResponse).await });
}

async fn handle_frame(shared: &Arc<Shared>, router: &Router, text: &str) {
    let frame = match RpcFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Discarding unparseable frame: {}", e);
            return;
        }
    };

    match frame {
        RpcFrame::Call(call) => {
            debug!("Handling call {} ({})", call.message_id, call.action);
            let reply = router.dispatch(call).await;
            if let Err(e) = send_frame(shared, &reply).await {
                error!("Failed to send reply {}: {}", reply.message_id(), e);
            }
        }
        RpcFrame::CallResult(result) => {
            resolve(shared, &result.message_id, Ok(result.payload)).await;
        }
        RpcFrame::CallError(call_error) => {
            let message_id = call_error.message_id.clone();
            resolve(
                shared,
                &message_id,
                Err(call_error.into_remote_error().into()),
            )
            .await;
        }
    }
}

/// Hand an inbound response to whoever registered its correlation id
async fn resolve(shared: &Shared, message_id: &str, outcome: Result<Value, SessionError>) {
    match shared.pending.lock().await.remove(message_id) {
        Some(PendingSlot::Deliver(tx)) => {
            if tx.send(outcome).is_err() {
                debug!("Caller for {} went away before the response", message_id);
            }
        }
        Some(PendingSlot::Ignore) => {
            debug!("Discarding acknowledgement for notification {}", message_id);
        }
        None => {
            warn!("Dropping response with unknown message id {}", message_id);
        }
    }
}

async fn send_frame(shared: &Shared, frame: &RpcFrame) -> Result<(), SessionError> {
    let text = frame.to_text()?;
    let mut sink = shared.sink.lock().await;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
