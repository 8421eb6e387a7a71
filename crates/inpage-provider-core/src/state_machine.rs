use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::domain::{
    is_valid_chain_id, normalize_network_version, InitialSnapshot, ProviderEvent, ProviderPhase,
    RpcError,
};
use crate::events::EventEmitter;

const RECOVERABLE_DISCONNECT_MESSAGE: &str =
    "Disconnected from the chain; attempting to reconnect.";
const TERMINAL_DISCONNECT_MESSAGE: &str =
    "Disconnected from the wallet backend; page reload required.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    /// `None` until the first account resolution.
    pub accounts: Option<Vec<String>>,
    pub is_connected: bool,
    pub is_unlocked: bool,
    pub initialized: bool,
    pub initializing: bool,
    pub is_permanently_disconnected: bool,
    pub chain_id: Option<String>,
    pub selected_address: Option<String>,
    pub network_version: Option<String>,
}

impl ProviderState {
    pub fn phase(&self) -> ProviderPhase {
        if self.is_permanently_disconnected {
            ProviderPhase::PermanentlyDisconnected
        } else if self.initialized {
            ProviderPhase::Active
        } else if self.initializing {
            ProviderPhase::Initializing
        } else {
            ProviderPhase::Uninitialized
        }
    }
}

#[derive(Default)]
struct Inner {
    state: ProviderState,
    /// Events produced while hydrating, delivered once `initialized` flips.
    deferred: Vec<ProviderEvent>,
    /// Connected before initialization without listeners being told.
    unannounced_connect: bool,
}

impl Inner {
    fn gate(&mut self, event: ProviderEvent, outbox: &mut Vec<ProviderEvent>) {
        if self.state.initialized {
            outbox.push(event);
        } else if self.state.initializing {
            self.deferred.push(event);
        } else {
            debug!(event = %event.kind(), "dropping event raised before initialization");
        }
    }
}

/// Owns connection, chain, account and lock state.
///
/// Handlers mutate state under the lock, release it, then deliver whatever
/// events the transition produced, so listeners always see settled state.
#[derive(Clone)]
pub struct ProviderStateMachine {
    inner: Arc<Mutex<Inner>>,
    emitter: EventEmitter,
    ready: Arc<watch::Sender<bool>>,
}

impl ProviderStateMachine {
    pub fn new(emitter: EventEmitter) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            emitter,
            ready: Arc::new(ready),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, outbox: Vec<ProviderEvent>) {
        for event in &outbox {
            self.emitter.emit(event);
        }
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn initialize(&self, snapshot: Option<InitialSnapshot>) -> Result<(), ProviderError> {
        {
            let mut g = self.lock();
            if g.state.initialized || g.state.initializing {
                return Err(ProviderError::AlreadyInitialized);
            }
            g.state.initializing = true;
        }

        if let Some(snapshot) = snapshot {
            // connect first so its listeners see a coherent world; unlock before
            // accounts because unlock itself forwards an accounts update.
            self.handle_connect(&snapshot.chain_id);
            self.handle_chain_changed(&snapshot.chain_id, snapshot.network_hint.as_deref());
            self.handle_unlock_state_changed(
                Some(&snapshot.accounts),
                &Value::Bool(snapshot.is_unlocked),
            );
            self.handle_accounts_changed(&snapshot.accounts, false);
        }

        let deferred = {
            let mut g = self.lock();
            g.state.initializing = false;
            g.state.initialized = true;
            std::mem::take(&mut g.deferred)
        };
        self.deliver(deferred);
        self.emitter.emit(&ProviderEvent::Initialized);
        self.ready.send_replace(true);
        Ok(())
    }

    pub async fn wait_until_initialized(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn handle_connect(&self, chain_id: &str) {
        {
            let mut g = self.lock();
            if g.state.is_permanently_disconnected {
                debug!(chain_id, "ignoring connect after permanent disconnect");
                return;
            }
            if g.state.is_connected && !g.unannounced_connect {
                return;
            }
            g.state.is_connected = true;
            if !(g.state.initialized || g.state.initializing) {
                // Announced by the next connect once initialization starts.
                g.unannounced_connect = true;
                debug!(chain_id, "dropping connect raised before initialization");
                return;
            }
            g.unannounced_connect = false;
        }
        self.emitter.emit(&ProviderEvent::Connect {
            chain_id: chain_id.to_owned(),
        });
    }

    pub fn handle_disconnect(&self, is_recoverable: bool, message: Option<&str>) {
        let mut outbox = Vec::new();
        {
            let mut g = self.lock();
            let st = &g.state;
            if !(st.is_connected || (!is_recoverable && !st.is_permanently_disconnected)) {
                return;
            }
            g.state.is_connected = false;
            g.unannounced_connect = false;

            let error = if is_recoverable {
                RpcError::try_again_later(message.unwrap_or(RECOVERABLE_DISCONNECT_MESSAGE))
            } else {
                g.state.chain_id = None;
                g.state.network_version = None;
                g.state.accounts = None;
                g.state.selected_address = None;
                g.state.is_unlocked = false;
                g.state.is_permanently_disconnected = true;
                let message = message.unwrap_or(TERMINAL_DISCONNECT_MESSAGE);
                error!(reason = message, "provider permanently disconnected");
                RpcError::internal(message)
            };
            g.gate(ProviderEvent::Disconnect { error }, &mut outbox);
        }
        self.deliver(outbox);
    }

    pub fn handle_chain_changed(&self, chain_id: &str, network_hint: Option<&str>) {
        if !is_valid_chain_id(chain_id) {
            warn!(chain_id, "received invalid chain id; ignoring update");
            return;
        }

        // A chain update implies the backend is reachable.
        self.handle_connect(chain_id);

        let mut outbox = Vec::new();
        {
            let mut g = self.lock();
            if g.state.is_permanently_disconnected {
                return;
            }
            if let Some(hint) = network_hint {
                g.state.network_version = normalize_network_version(hint);
            }
            if g.state.chain_id.as_deref() != Some(chain_id) {
                g.state.chain_id = Some(chain_id.to_owned());
                g.gate(ProviderEvent::ChainChanged(chain_id.to_owned()), &mut outbox);
            }
        }
        self.deliver(outbox);
    }

    pub fn handle_accounts_changed(&self, accounts: &Value, is_passive: bool) {
        let accounts = sanitize_accounts(accounts);

        let mut outbox = Vec::new();
        {
            let mut g = self.lock();
            if g.state.is_permanently_disconnected {
                debug!("ignoring accounts update after permanent disconnect");
                return;
            }
            if g.state.accounts.as_ref() == Some(&accounts) {
                return;
            }
            if is_passive && g.state.accounts.is_some() {
                error!(
                    ?accounts,
                    previous = ?g.state.accounts,
                    "eth_accounts unexpectedly updated accounts; this indicates a backend bug"
                );
            }
            g.state.selected_address = accounts.first().cloned();
            g.state.accounts = Some(accounts.clone());
            g.gate(ProviderEvent::AccountsChanged(accounts), &mut outbox);
        }
        self.deliver(outbox);
    }

    pub fn handle_unlock_state_changed(&self, accounts: Option<&Value>, is_unlocked: &Value) {
        let Some(is_unlocked) = is_unlocked.as_bool() else {
            warn!(?is_unlocked, "received non-boolean unlock state; ignoring update");
            return;
        };
        {
            let mut g = self.lock();
            if g.state.is_permanently_disconnected || g.state.is_unlocked == is_unlocked {
                return;
            }
            g.state.is_unlocked = is_unlocked;
        }
        let empty = Value::Array(Vec::new());
        self.handle_accounts_changed(accounts.unwrap_or(&empty), false);
    }

    pub fn snapshot(&self) -> ProviderState {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> ProviderPhase {
        self.lock().state.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().state.is_connected
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock().state.is_unlocked
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().state.initialized
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        self.lock().state.is_permanently_disconnected
    }

    pub fn accounts(&self) -> Option<Vec<String>> {
        self.lock().state.accounts.clone()
    }

    pub fn chain_id(&self) -> Option<String> {
        self.lock().state.chain_id.clone()
    }

    pub fn selected_address(&self) -> Option<String> {
        self.lock().state.selected_address.clone()
    }

    pub fn network_version(&self) -> Option<String> {
        self.lock().state.network_version.clone()
    }
}

impl Default for ProviderStateMachine {
    fn default() -> Self {
        Self::new(EventEmitter::default())
    }
}

/// Non-arrays and arrays holding anything but strings collapse to `[]`.
fn sanitize_accounts(raw: &Value) -> Vec<String> {
    let Some(items) = raw.as_array() else {
        warn!(?raw, "accounts payload is not an array; treating as empty");
        return Vec::new();
    };
    let mut accounts = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(account) => accounts.push(account.to_owned()),
            None => {
                warn!(?raw, "accounts payload holds a non-string entry; treating as empty");
                return Vec::new();
            }
        }
    }
    accounts
}
