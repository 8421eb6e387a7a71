use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{EventKind, RpcError};
use crate::events::{Listener, ListenerId};
use crate::ports::{Eip1193Provider, SlotValue};

#[derive(Debug, Error)]
pub enum IndirectionError {
    #[error("delegate must be a provider object, got {0}")]
    InvalidDelegate(String),
}

type RetargetObserver = Arc<dyn Fn() + Send + Sync>;

/// Stable handle whose delegate can be replaced after the handle has been
/// handed out. Clones share one delegate slot.
///
/// Each operation reads the delegate once and runs entirely against that
/// snapshot; a swap affects only operations that start after it.
pub struct Indirection<D: ?Sized> {
    delegate: Arc<RwLock<Arc<D>>>,
    observers: Arc<Mutex<Vec<RetargetObserver>>>,
}

impl<D: ?Sized> Clone for Indirection<D> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<D: ?Sized> Indirection<D> {
    pub fn new(delegate: Arc<D>) -> Self {
        Self {
            delegate: Arc::new(RwLock::new(delegate)),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn assign_delegate(&self, delegate: Arc<D>) {
        {
            let mut g = self.delegate.write().unwrap_or_else(PoisonError::into_inner);
            *g = delegate;
        }
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(observers = observers.len(), "indirection retargeted");
        for observer in &observers {
            observer();
        }
    }

    /// Diagnostic access; operations should go through the handle itself.
    pub fn current_delegate(&self) -> Arc<D> {
        let g = self.delegate.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*g)
    }

    pub fn with_delegate<R>(&self, op: impl FnOnce(&D) -> R) -> R {
        let delegate = self.current_delegate();
        op(&delegate)
    }

    /// Runs after every `assign_delegate`, outside the delegate lock.
    pub fn on_retarget(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn shares_slot_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.delegate, &other.delegate)
    }
}

impl Indirection<dyn Eip1193Provider> {
    pub fn assign_from_slot(&self, value: &SlotValue) -> Result<(), IndirectionError> {
        match value {
            SlotValue::Provider(provider) => {
                self.assign_delegate(Arc::clone(provider));
                Ok(())
            }
            SlotValue::Data(data) => Err(IndirectionError::InvalidDelegate(data.to_string())),
        }
    }
}

#[async_trait]
impl Eip1193Provider for Indirection<dyn Eip1193Provider> {
    async fn request(&self, args: Value) -> Result<Value, RpcError> {
        let delegate = self.current_delegate();
        delegate.request(args).await
    }

    fn is_connected(&self) -> bool {
        self.with_delegate(|d| d.is_connected())
    }

    fn chain_id(&self) -> Option<String> {
        self.with_delegate(|d| d.chain_id())
    }

    fn selected_address(&self) -> Option<String> {
        self.with_delegate(|d| d.selected_address())
    }

    fn property(&self, key: &str) -> Option<Value> {
        self.with_delegate(|d| d.property(key))
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.with_delegate(|d| d.on(kind, listener))
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.with_delegate(|d| d.remove_listener(kind, id))
    }
}
