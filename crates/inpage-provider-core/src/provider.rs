use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::dispatcher::RpcDispatcher;
use crate::domain::{
    BackendNotification, EventKind, InitialSnapshot, JsonRpcRequest, JsonRpcResponse,
    ProviderEvent, RequestArguments, RpcError, RpcPayload, RpcResponsePayload,
    ETH_REQUEST_ACCOUNTS, ETH_SUBSCRIPTION, GET_PROVIDER_STATE, JSONRPC_VERSION,
};
use crate::events::{EventEmitter, Listener, ListenerId};
use crate::ports::{Eip1193Provider, RpcEngine};
use crate::state_machine::{ProviderError, ProviderStateMachine};
use crate::validator::validate_request_args;

/// Property that marks an object as this provider implementation.
pub const IDENTITY_FLAG: &str = "isInpageProvider";

#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub max_event_listeners: usize,
    pub jsonrpc_version: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            max_event_listeners: 100,
            jsonrpc_version: JSONRPC_VERSION.to_owned(),
        }
    }
}

/// The object page code talks to.
pub struct InpageProvider {
    state: ProviderStateMachine,
    dispatcher: RpcDispatcher,
    enable_warned: AtomicBool,
}

impl InpageProvider {
    pub fn new(engine: Arc<dyn RpcEngine>, options: ProviderOptions) -> Self {
        let state = ProviderStateMachine::new(EventEmitter::new(options.max_event_listeners));
        let dispatcher = RpcDispatcher::new(engine, state.clone(), options.jsonrpc_version);
        Self {
            state,
            dispatcher,
            enable_warned: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &ProviderStateMachine {
        &self.state
    }

    pub fn dispatcher(&self) -> &RpcDispatcher {
        &self.dispatcher
    }

    pub fn initialize(&self, snapshot: Option<InitialSnapshot>) -> Result<(), ProviderError> {
        self.state.initialize(snapshot)
    }

    /// Hydrates from the backend's own view of the provider state. A failed
    /// or malformed answer still completes initialization, without a snapshot.
    pub async fn initialize_from_backend(&self) -> Result<(), ProviderError> {
        let request = JsonRpcRequest::from(RequestArguments::new(GET_PROVIDER_STATE, None));
        let snapshot = match self.dispatcher.submit_single(request).await {
            Ok(response) => match response.into_result() {
                Ok(raw) => match serde_json::from_value::<InitialSnapshot>(raw) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        error!(error = %e, "backend returned a malformed provider state");
                        None
                    }
                },
                Err(e) => {
                    error!(error = %e, "failed to fetch initial provider state");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "failed to fetch initial provider state");
                None
            }
        };
        self.initialize(snapshot)
    }

    pub async fn wait_until_initialized(&self) {
        self.state.wait_until_initialized().await;
    }

    /// Waits for hydration, then reports the lock state.
    pub async fn is_unlocked(&self) -> bool {
        self.wait_until_initialized().await;
        self.state.is_unlocked()
    }

    pub fn network_version(&self) -> Option<String> {
        self.state.network_version()
    }

    pub fn accounts(&self) -> Option<Vec<String>> {
        self.state.accounts()
    }

    pub fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.state.emitter().once(kind, listener)
    }

    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        self.state.emitter().remove_all_listeners(kind);
    }

    pub fn handle_notification(&self, notification: BackendNotification) {
        match notification {
            BackendNotification::Connect { chain_id } => self.state.handle_connect(&chain_id),
            BackendNotification::Disconnect {
                is_recoverable,
                message,
            } => self
                .state
                .handle_disconnect(is_recoverable, message.as_deref()),
            BackendNotification::ChainChanged {
                chain_id,
                network_hint,
            } => self
                .state
                .handle_chain_changed(&chain_id, network_hint.as_deref()),
            BackendNotification::AccountsChanged { accounts } => {
                self.state.handle_accounts_changed(&accounts, false)
            }
            BackendNotification::UnlockStateChanged {
                accounts,
                is_unlocked,
            } => self
                .state
                .handle_unlock_state_changed(accounts.as_ref(), &is_unlocked),
            BackendNotification::Subscription {
                subscription,
                result,
            } => {
                self.state.emitter().emit(&ProviderEvent::Message {
                    kind: ETH_SUBSCRIPTION.to_owned(),
                    data: json!({ "subscription": subscription, "result": result }),
                });
            }
        }
    }

    /// The backend stream is gone for good.
    pub fn handle_stream_end(&self, reason: &str) {
        self.state.handle_disconnect(false, Some(reason));
    }

    /// Legacy alias for `eth_requestAccounts`.
    pub async fn enable(&self) -> Result<Vec<String>, RpcError> {
        if !self.enable_warned.swap(true, Ordering::Relaxed) {
            warn!("enable() is deprecated; use request({{ method: 'eth_requestAccounts' }})");
        }
        let result = self
            .request(json!({ "method": ETH_REQUEST_ACCOUNTS }))
            .await?;
        serde_json::from_value(result).map_err(|e| {
            RpcError::internal(format!("eth_requestAccounts returned a non-list result: {e}"))
        })
    }

    /// Legacy batch path: every entry is validated, then the batch travels as
    /// one unit and is not intercepted.
    pub async fn send_batch(&self, calls: Vec<Value>) -> Result<Vec<JsonRpcResponse>, RpcError> {
        let mut requests = Vec::with_capacity(calls.len());
        for call in &calls {
            let args = validate_request_args(call)?;
            let mut request = JsonRpcRequest::from(args);
            request.id = call.get("id").cloned();
            requests.push(request);
        }
        match self.dispatcher.submit(RpcPayload::Batch(requests)).await? {
            RpcResponsePayload::Batch(responses) => Ok(responses),
            RpcResponsePayload::Single(response) => Ok(vec![response]),
        }
    }
}

#[async_trait]
impl Eip1193Provider for InpageProvider {
    async fn request(&self, args: Value) -> Result<Value, RpcError> {
        let args = validate_request_args(&args)?;
        self.dispatcher
            .submit_single(JsonRpcRequest::from(args))
            .await?
            .into_result()
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn chain_id(&self) -> Option<String> {
        self.state.chain_id()
    }

    fn selected_address(&self) -> Option<String> {
        self.state.selected_address()
    }

    fn property(&self, key: &str) -> Option<Value> {
        match key {
            IDENTITY_FLAG => Some(Value::Bool(true)),
            "isConnected" => Some(Value::Bool(self.state.is_connected())),
            "chainId" => Some(self.state.chain_id().map_or(Value::Null, Value::String)),
            "selectedAddress" => Some(
                self.state
                    .selected_address()
                    .map_or(Value::Null, Value::String),
            ),
            "networkVersion" => Some(
                self.state
                    .network_version()
                    .map_or(Value::Null, Value::String),
            ),
            _ => None,
        }
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.state.emitter().on(kind, listener)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.state.emitter().remove_listener(kind, id)
    }
}
