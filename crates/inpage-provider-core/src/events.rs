use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::domain::{EventKind, ProviderEvent};

pub type Listener = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

#[derive(Default)]
struct EmitterState {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<Registration>>,
}

/// Synchronous publish/subscribe channel keyed by event kind.
///
/// Delivery iterates over a snapshot of the registrations, so listeners may
/// add or remove listeners (including themselves) while being called.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<Mutex<EmitterState>>,
    max_listeners: usize,
}

impl EventEmitter {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EmitterState::default())),
            max_listeners,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, listener, false)
    }

    pub fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, listener, true)
    }

    fn register(&self, kind: EventKind, listener: Listener, once: bool) -> ListenerId {
        let mut g = self.lock();
        g.next_id = g.next_id.saturating_add(1);
        let id = ListenerId(g.next_id);
        let list = g.listeners.entry(kind).or_default();
        list.push(Registration { id, listener, once });
        if self.max_listeners > 0 && list.len() > self.max_listeners {
            warn!(
                event = %kind,
                count = list.len(),
                max = self.max_listeners,
                "possible listener leak detected"
            );
        }
        id
    }

    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut g = self.lock();
        let Some(list) = g.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        before != list.len()
    }

    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut g = self.lock();
        match kind {
            Some(kind) => {
                g.listeners.remove(&kind);
            }
            None => g.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Returns whether any listener was called.
    pub fn emit(&self, event: &ProviderEvent) -> bool {
        let kind = event.kind();
        let snapshot = {
            let mut g = self.lock();
            let Some(list) = g.listeners.get_mut(&kind) else {
                return false;
            };
            let snapshot = list.clone();
            list.retain(|r| !r.once);
            snapshot
        };
        for registration in &snapshot {
            (registration.listener)(event);
        }
        !snapshot.is_empty()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(100)
    }
}
