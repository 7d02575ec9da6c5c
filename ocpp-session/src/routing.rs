//! Inbound call dispatch
//!
//! Maps OCPP actions to async handlers. Handlers take a typed request and
//! produce a typed response; payload decoding and encoding happen at the
//! router boundary so handler code never touches raw JSON. Every inbound
//! call yields exactly one reply frame, either a result or a call error.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use ocpp_rpc::{Action, Call, CallError, CallResult, RpcFrame};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>;
type BoxedHandler = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

#[derive(Debug)]
enum DispatchError {
    Decode(String),
    Encode(String),
}

/// Action-to-handler table for one side of a session
#[derive(Default)]
pub struct Router {
    handlers: HashMap<Action, BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an action.
    ///
    /// The handler receives the decoded request payload and returns the
    /// response payload. Registering an action twice replaces the earlier
    /// handler.
    pub fn on<Req, Resp, F, Fut>(mut self, action: Action, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
    {
        let handler = Box::new(move |payload: Value| -> HandlerFuture {
            let request = match serde_json::from_value::<Req>(payload) {
                Ok(request) => request,
                Err(e) => {
                    return Box::pin(std::future::ready(Err(DispatchError::Decode(
                        e.to_string(),
                    ))))
                }
            };
            let response = handler(request);
            Box::pin(async move {
                serde_json::to_value(response.await)
                    .map_err(|e| DispatchError::Encode(e.to_string()))
            })
        });
        self.handlers.insert(action, handler);
        self
    }

    /// Run the handler for a call and build the reply frame.
    ///
    /// Unknown and unregistered actions get a NotImplemented call error,
    /// undecodable payloads a FormatViolation, so the station always learns
    /// the fate of its call.
    pub async fn dispatch(&self, call: Call) -> RpcFrame {
        let handler = Action::from_str(&call.action)
            .ok()
            .and_then(|action| self.handlers.get(&action));
        let handler = match handler {
            Some(handler) => handler,
            None => {
                warn!("No handler for action {}", call.action);
                return RpcFrame::CallError(CallError::not_implemented(
                    call.message_id,
                    &call.action,
                ));
            }
        };

        match handler(call.payload).await {
            Ok(payload) => RpcFrame::CallResult(CallResult {
                message_id: call.message_id,
                payload,
            }),
            Err(DispatchError::Decode(detail)) => {
                RpcFrame::CallError(CallError::format_violation(call.message_id, detail))
            }
            Err(DispatchError::Encode(detail)) => {
                RpcFrame::CallError(CallError::internal_error(call.message_id, detail))
            }
        }
    }
}
