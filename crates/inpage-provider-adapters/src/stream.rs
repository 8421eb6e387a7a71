use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use inpage_provider_core::{
    BackendNotification, InpageProvider, JsonRpcRequest, JsonRpcResponse, PortError, RpcEngine,
    RpcError, RpcPayload, RpcResponsePayload,
};

type Waiter = oneshot::Sender<Result<JsonRpcResponse, RpcError>>;

/// JSON-RPC over a duplex message stream. Outbound frames go to `outbound`;
/// inbound frames are fed to `receive_frame` (usually by [`pump_inbound`]).
///
/// Each in-flight request owns one waiter keyed by its id until its response
/// arrives or the stream closes.
#[derive(Debug)]
pub struct StreamEngine {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Mutex<HashMap<String, Waiter>>,
    closed: AtomicBool,
}

impl StreamEngine {
    pub fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn register(&self, request: &JsonRpcRequest) -> Result<PendingCall<'_>, PortError> {
        if self.is_closed() {
            return Err(PortError::Transport("stream is closed".to_owned()));
        }
        let id = request
            .id
            .as_ref()
            .filter(|id| !id.is_null())
            .ok_or_else(|| PortError::Validation("stream requests require an id".to_owned()))?;
        let key = correlation_key(id);
        let (tx, rx) = oneshot::channel();
        let mut g = self
            .pending
            .lock()
            .map_err(|e| PortError::Transport(format!("stream lock poisoned: {e}")))?;
        if g.contains_key(&key) {
            return Err(PortError::Validation(format!(
                "request id {key} is already in flight"
            )));
        }
        g.insert(key.clone(), tx);
        Ok(PendingCall {
            engine: self,
            key,
            rx,
        })
    }

    /// Drops the waiter under `key` if its caller is gone. A live waiter
    /// registered later under the same id is left alone.
    fn forget_abandoned(&self, key: &str) {
        if let Ok(mut g) = self.pending.lock() {
            if g.get(key).is_some_and(oneshot::Sender::is_closed) {
                g.remove(key);
                debug!(id = %key, "released waiter of abandoned request");
            }
        }
    }

    fn send_frame(&self, frame: Value) -> Result<(), PortError> {
        self.outbound
            .send(frame)
            .map_err(|_| PortError::Transport("outbound stream closed".to_owned()))
    }

    /// Routes one inbound frame. Responses resolve their waiter; anything
    /// else is returned as a backend notification when it parses as one.
    pub fn receive_frame(&self, frame: Value) -> Option<BackendNotification> {
        if let Value::Array(items) = frame {
            for item in items {
                if let Some(notification) = self.receive_frame(item) {
                    warn!(?notification, "dropping notification nested in a batch frame");
                }
            }
            return None;
        }

        let is_response = frame.get("id").is_some_and(|id| !id.is_null())
            && (frame.get("result").is_some() || frame.get("error").is_some());
        if is_response {
            match serde_json::from_value::<JsonRpcResponse>(frame) {
                Ok(response) => self.resolve(response),
                Err(e) => warn!(error = %e, "dropping malformed response frame"),
            }
            return None;
        }

        match serde_json::from_value::<BackendNotification>(frame) {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(error = %e, "dropping unrecognized inbound frame");
                None
            }
        }
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let key = correlation_key(&response.id);
        let waiter = match self.pending.lock() {
            Ok(mut g) => g.remove(&key),
            Err(e) => {
                warn!(error = %e, "stream lock poisoned; dropping response");
                return;
            }
        };
        match waiter {
            Some(waiter) => {
                if waiter.send(Ok(response)).is_err() {
                    debug!(id = %key, "caller went away before its response arrived");
                }
            }
            None => warn!(id = %key, "response for unknown request id"),
        }
    }

    /// Fails every pending request and refuses new ones.
    pub fn close(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Waiter> = match self.pending.lock() {
            Ok(mut g) => g.drain().map(|(_, w)| w).collect(),
            Err(_) => Vec::new(),
        };
        for waiter in drained {
            let _ = waiter.send(Err(RpcError::internal(format!("transport closed: {reason}"))));
        }
    }
}

#[async_trait]
impl RpcEngine for StreamEngine {
    async fn handle(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError> {
        match payload {
            RpcPayload::Single(request) => {
                let mut call = self.register(&request)?;
                let frame = serde_json::to_value(&request)
                    .map_err(|e| PortError::Validation(format!("request encode failed: {e}")))?;
                self.send_frame(frame)?;
                call.response().await.map(RpcResponsePayload::Single)
            }
            RpcPayload::Batch(requests) => {
                let mut calls = Vec::with_capacity(requests.len());
                for request in &requests {
                    calls.push(self.register(request)?);
                }
                let frame = serde_json::to_value(&requests)
                    .map_err(|e| PortError::Validation(format!("batch encode failed: {e}")))?;
                self.send_frame(frame)?;
                let mut responses = Vec::with_capacity(calls.len());
                for call in &mut calls {
                    responses.push(call.response().await?);
                }
                Ok(RpcResponsePayload::Batch(responses))
            }
        }
    }
}

/// One registered waiter. Dropping it unregisters the id unless a response
/// already claimed it, so cancelled callers do not leak entries.
struct PendingCall<'a> {
    engine: &'a StreamEngine,
    key: String,
    rx: oneshot::Receiver<Result<JsonRpcResponse, RpcError>>,
}

impl PendingCall<'_> {
    async fn response(&mut self) -> Result<JsonRpcResponse, RpcError> {
        (&mut self.rx)
            .await
            .map_err(|_| RpcError::internal("stream dropped the pending request"))?
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.rx.close();
        self.engine.forget_abandoned(&self.key);
    }
}

/// Feeds inbound frames to the engine and routes notifications to the
/// provider until the inbound stream ends, which is terminal.
pub async fn pump_inbound(
    engine: Arc<StreamEngine>,
    provider: Arc<InpageProvider>,
    mut inbound: mpsc::UnboundedReceiver<Value>,
) {
    while let Some(frame) = inbound.recv().await {
        if let Some(notification) = engine.receive_frame(frame) {
            provider.handle_notification(notification);
        }
    }
    engine.close("inbound stream ended");
    provider.handle_stream_end("inbound stream ended");
}

fn correlation_key(id: &Value) -> String {
    id.to_string()
}
