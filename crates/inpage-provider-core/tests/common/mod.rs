#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use inpage_provider_core::{
    Eip1193Provider, EventEmitter, EventKind, GlobalScope, InpageProvider, JsonRpcRequest,
    JsonRpcResponse, Listener, ListenerId, PortError, ProviderChoice, ProviderChooser,
    ProviderEvent, ProviderOptions, RpcEngine, RpcError, RpcPayload, RpcResponsePayload,
    SlotValue, TimerPort,
};

type Answer = dyn Fn(&JsonRpcRequest) -> Result<Value, RpcError> + Send + Sync;

/// Engine that answers from a closure and remembers every payload.
pub struct ScriptedEngine {
    payloads: Mutex<Vec<RpcPayload>>,
    answer: Box<Answer>,
    transport_error: Option<RpcError>,
}

impl ScriptedEngine {
    pub fn answering(
        answer: impl Fn(&JsonRpcRequest) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
            answer: Box::new(answer),
            transport_error: None,
        })
    }

    pub fn failing(error: RpcError) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
            answer: Box::new(|_| Ok(Value::Null)),
            transport_error: Some(error),
        })
    }

    pub fn payloads(&self) -> Vec<RpcPayload> {
        self.payloads.lock().expect("payload lock").clone()
    }

    fn respond(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::from_outcome(
            request.id.clone().unwrap_or(Value::Null),
            (self.answer)(request),
        )
    }
}

#[async_trait]
impl RpcEngine for ScriptedEngine {
    async fn handle(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError> {
        self.payloads
            .lock()
            .expect("payload lock")
            .push(payload.clone());
        if let Some(err) = &self.transport_error {
            return Err(err.clone());
        }
        Ok(match payload {
            RpcPayload::Single(request) => RpcResponsePayload::Single(self.respond(&request)),
            RpcPayload::Batch(requests) => {
                RpcResponsePayload::Batch(requests.iter().map(|r| self.respond(r)).collect())
            }
        })
    }
}

pub fn provider_with(engine: Arc<dyn RpcEngine>) -> Arc<InpageProvider> {
    Arc::new(InpageProvider::new(engine, ProviderOptions::default()))
}

/// Records everything an emitter delivers.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ProviderEvent>>>);

impl EventLog {
    pub fn attach(emitter: &EventEmitter) -> Self {
        let log = Self::default();
        for kind in EventKind::ALL {
            let sink = Arc::clone(&log.0);
            emitter.on(
                kind,
                Arc::new(move |event: &ProviderEvent| {
                    sink.lock().expect("event log lock").push(event.clone());
                }),
            );
        }
        log
    }

    pub fn events(&self) -> Vec<ProviderEvent> {
        self.0.lock().expect("event log lock").clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(ProviderEvent::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.0.lock().expect("event log lock").clear();
    }
}

#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber that writes into a buffer and returns the text.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let text = String::from_utf8_lossy(&capture.0.lock().expect("log lock")).to_string();
    (out, text)
}

/// A foreign provider that answers every request with its label.
pub struct StubProvider {
    pub label: &'static str,
    requests: Mutex<Vec<Value>>,
    emitter: EventEmitter,
    gated: bool,
    pub started: Notify,
    pub release: Notify,
}

impl StubProvider {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self::build(label, false))
    }

    /// Requests park until `release` is notified, after signalling `started`.
    pub fn gated(label: &'static str) -> Arc<Self> {
        Arc::new(Self::build(label, true))
    }

    fn build(label: &'static str, gated: bool) -> Self {
        Self {
            label,
            requests: Mutex::new(Vec::new()),
            emitter: EventEmitter::default(),
            gated,
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

#[async_trait]
impl Eip1193Provider for StubProvider {
    async fn request(&self, args: Value) -> Result<Value, RpcError> {
        self.requests.lock().expect("requests lock").push(args);
        if self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        Ok(json!(self.label))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn chain_id(&self) -> Option<String> {
        Some("0x5".to_owned())
    }

    fn selected_address(&self) -> Option<String> {
        Some(format!("0x{}", self.label))
    }

    fn property(&self, key: &str) -> Option<Value> {
        (key == "label").then(|| json!(self.label))
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.emitter.on(kind, listener)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.emitter.remove_listener(kind, id)
    }
}

pub struct FixedChooser {
    choice: ProviderChoice,
    pub prompts: AtomicU32,
}

impl FixedChooser {
    pub fn new(choice: ProviderChoice) -> Arc<Self> {
        Arc::new(Self {
            choice,
            prompts: AtomicU32::new(0),
        })
    }

    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderChooser for FixedChooser {
    async fn choose(&self) -> Result<ProviderChoice, PortError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.choice)
    }
}

/// Chooser whose prompt always fails with a policy error.
#[derive(Default)]
pub struct FailingChooser {
    pub prompts: AtomicU32,
}

impl FailingChooser {
    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderChooser for FailingChooser {
    async fn choose(&self) -> Result<ProviderChoice, PortError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Err(PortError::Policy("provider prompt dismissed".to_owned()))
    }
}

#[derive(Default)]
pub struct MockScope {
    slots: Mutex<HashMap<String, SlotValue>>,
    sealed: Mutex<HashSet<String>>,
    events: Mutex<Vec<String>>,
}

impl MockScope {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn is_sealed(&self, name: &str) -> bool {
        self.sealed.lock().expect("sealed lock").contains(name)
    }
}

impl GlobalScope for MockScope {
    fn get_slot(&self, name: &str) -> Result<Option<SlotValue>, PortError> {
        Ok(self.slots.lock().expect("slots lock").get(name).cloned())
    }

    fn set_slot(&self, name: &str, value: SlotValue) -> Result<(), PortError> {
        if self.is_sealed(name) {
            return Err(PortError::Policy(format!("global slot {name} is sealed")));
        }
        self.slots
            .lock()
            .expect("slots lock")
            .insert(name.to_owned(), value);
        Ok(())
    }

    fn seal_slot(&self, name: &str) -> Result<(), PortError> {
        self.sealed
            .lock()
            .expect("sealed lock")
            .insert(name.to_owned());
        Ok(())
    }

    fn dispatch_event(&self, name: &str) -> Result<(), PortError> {
        self.events.lock().expect("events lock").push(name.to_owned());
        Ok(())
    }
}

type SleepHook = dyn Fn(u32) + Send + Sync;

/// Timer that returns immediately, optionally running a hook on each sleep.
#[derive(Default)]
pub struct InstantTimer {
    sleeps: AtomicU32,
    hook: Option<Box<SleepHook>>,
}

impl InstantTimer {
    pub fn with_hook(hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        Self {
            sleeps: AtomicU32::new(0),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimerPort for InstantTimer {
    async fn sleep_ms(&self, _ms: u64) {
        let n = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.hook {
            hook(n);
        }
    }
}
