use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use inpage_provider_core::{GlobalScope, PortError, SlotValue};

/// Host global namespace kept in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGlobalScope {
    inner: Arc<Mutex<ScopeState>>,
}

#[derive(Debug, Default)]
struct ScopeState {
    slots: HashMap<String, SlotValue>,
    sealed: HashSet<String>,
    events: Vec<String>,
}

impl InMemoryGlobalScope {
    pub fn is_sealed(&self, name: &str) -> Result<bool, PortError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        Ok(g.sealed.contains(name))
    }

    pub fn dispatched_events(&self) -> Result<Vec<String>, PortError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        Ok(g.events.clone())
    }
}

impl GlobalScope for InMemoryGlobalScope {
    fn get_slot(&self, name: &str) -> Result<Option<SlotValue>, PortError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        Ok(g.slots.get(name).cloned())
    }

    fn set_slot(&self, name: &str, value: SlotValue) -> Result<(), PortError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        if g.sealed.contains(name) {
            return Err(PortError::Policy(format!("global slot {name} is sealed")));
        }
        g.slots.insert(name.to_owned(), value);
        Ok(())
    }

    fn seal_slot(&self, name: &str) -> Result<(), PortError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        if !g.slots.contains_key(name) {
            return Err(PortError::NotFound(format!("global slot {name} is empty")));
        }
        g.sealed.insert(name.to_owned());
        Ok(())
    }

    fn dispatch_event(&self, name: &str) -> Result<(), PortError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("scope lock poisoned: {e}")))?;
        g.events.push(name.to_owned());
        Ok(())
    }
}
