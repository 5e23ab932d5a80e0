//! Request/response message contract
//!
//! The wire-level protocol between callers and the isolation boundary:
//! JSON request and response messages correlated by id, plus a one-shot
//! readiness signal emitted before any request is accepted. Responses may
//! arrive in any order relative to submission; correlation is by id only.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::engine::Engine;
use crate::types::{ErrorKind, ExecutionRequest, ExecutionResult, HostValue};

/// A request submitted over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Opaque correlation token, unique per in-flight request.
    pub id: String,

    /// Guest-language source text.
    pub code: String,

    /// Named input values.
    #[serde(default)]
    pub inputs: IndexMap<String, HostValue>,
}

impl From<RequestMessage> for ExecutionRequest {
    fn from(message: RequestMessage) -> Self {
        Self {
            id: message.id,
            code: message.code,
            inputs: message.inputs,
        }
    }
}

impl From<ExecutionRequest> for RequestMessage {
    fn from(request: ExecutionRequest) -> Self {
        Self {
            id: request.id,
            code: request.code,
            inputs: request.inputs,
        }
    }
}

/// The response for one request id.
///
/// `error` is present exactly when `success` is false and carries the
/// human-readable rendering; `error_kind` carries the formal
/// classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Matches the id of the originating request.
    pub id: String,

    /// Whether the execution produced a value.
    pub success: bool,

    /// The dumped result value, when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Human-readable failure description, when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Formal failure classification, when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl From<ExecutionResult> for ResponseMessage {
    fn from(result: ExecutionResult) -> Self {
        match result.outcome {
            Ok(value) => Self {
                id: result.id,
                success: true,
                result: Some(value),
                error: None,
                error_kind: None,
            },
            Err(error) => Self {
                id: result.id,
                success: false,
                result: None,
                error_kind: Some(error.kind()),
                error: Some(error.to_string()),
            },
        }
    }
}

/// One-shot readiness signal, emitted before any response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyMessage {
    #[serde(rename = "type")]
    pub message_type: String,
}

impl ReadyMessage {
    pub fn new() -> Self {
        Self {
            message_type: "ready".to_string(),
        }
    }
}

impl Default for ReadyMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// A message travelling from the engine to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Ready(ReadyMessage),
    Response(ResponseMessage),
}

/// Serve requests until the request channel closes.
///
/// Emits the readiness signal once the engine's runtime dependency has
/// initialised, then runs one task per request so responses complete in
/// whatever order executions finish. Exactly one response is sent per
/// accepted request. If the engine fails to initialise, no readiness
/// signal is emitted and every request is answered with a sandbox error.
#[instrument(skip_all)]
pub async fn serve(
    engine: Arc<Engine>,
    mut requests: mpsc::Receiver<RequestMessage>,
    responses: mpsc::Sender<OutboundMessage>,
) {
    match engine.ready().await {
        Ok(()) => {
            if responses
                .send(OutboundMessage::Ready(ReadyMessage::new()))
                .await
                .is_err()
            {
                return;
            }
            debug!("readiness signal emitted");
        }
        Err(error) => {
            warn!(%error, "engine failed to initialise, requests will be refused");
        }
    }

    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => {
                    debug!(id = %request.id, "request accepted");
                    let engine = Arc::clone(&engine);
                    let responses = responses.clone();
                    sessions.spawn(async move {
                        let result = engine.execute(request.into()).await;
                        let _ = responses
                            .send(OutboundMessage::Response(result.into()))
                            .await;
                    });
                }
                None => break,
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    // The request channel closed; drain outstanding sessions so every
    // accepted request still gets its response.
    while sessions.join_next().await.is_some() {}
}
