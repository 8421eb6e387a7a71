use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{codes, EventKind, RpcError, RpcPayload, RpcResponsePayload};
use crate::events::{Listener, ListenerId};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<PortError> for RpcError {
    fn from(err: PortError) -> Self {
        let code = match &err {
            PortError::NotImplemented(_) => codes::UNSUPPORTED_METHOD,
            PortError::Transport(_) => codes::INTERNAL,
            PortError::Validation(_) => codes::INVALID_PARAMS,
            PortError::Policy(_) => codes::UNAUTHORIZED,
            PortError::NotFound(_) => codes::RESOURCE_NOT_FOUND,
        };
        RpcError::new(code, err.to_string())
    }
}

/// The EIP-1193 surface shared by this provider, foreign providers and the
/// indirection handle that fronts either of them.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, args: Value) -> Result<Value, RpcError>;
    fn is_connected(&self) -> bool;
    fn chain_id(&self) -> Option<String>;
    fn selected_address(&self) -> Option<String>;
    /// Property read by name, `None` when the provider has no such property.
    fn property(&self, key: &str) -> Option<Value>;
    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId;
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool;
}

/// Black-box JSON-RPC engine: middleware chain terminating in a transport.
#[async_trait]
pub trait RpcEngine: Send + Sync {
    async fn handle(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderChoice {
    This,
    Other,
}

/// User-facing confirmation between this provider and a competing one.
#[async_trait]
pub trait ProviderChooser: Send + Sync {
    async fn choose(&self) -> Result<ProviderChoice, PortError>;
}

#[async_trait]
pub trait TimerPort: Send + Sync {
    async fn sleep_ms(&self, ms: u64);
}

/// Host global namespace holding the well-known provider slot.
pub trait GlobalScope: Send + Sync {
    fn get_slot(&self, name: &str) -> Result<Option<SlotValue>, PortError>;
    fn set_slot(&self, name: &str, value: SlotValue) -> Result<(), PortError>;
    /// After sealing, `set_slot` on `name` must fail.
    fn seal_slot(&self, name: &str) -> Result<(), PortError>;
    fn dispatch_event(&self, name: &str) -> Result<(), PortError>;
}

#[derive(Clone)]
pub enum SlotValue {
    Provider(Arc<dyn Eip1193Provider>),
    Data(Value),
}

impl SlotValue {
    pub fn as_provider(&self) -> Option<&Arc<dyn Eip1193Provider>> {
        match self {
            SlotValue::Provider(p) => Some(p),
            SlotValue::Data(_) => None,
        }
    }

    pub fn is_provider(&self, other: &Arc<dyn Eip1193Provider>) -> bool {
        self.as_provider().is_some_and(|p| same_provider(p, other))
    }
}

impl fmt::Debug for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Provider(p) => f
                .debug_tuple("Provider")
                .field(&Arc::as_ptr(p).cast::<()>())
                .finish(),
            SlotValue::Data(v) => f.debug_tuple("Data").field(v).finish(),
        }
    }
}

/// Object identity, ignoring vtables.
pub fn same_provider(a: &Arc<dyn Eip1193Provider>, b: &Arc<dyn Eip1193Provider>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
