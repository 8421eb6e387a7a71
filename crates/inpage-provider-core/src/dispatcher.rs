use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{
    JsonRpcRequest, JsonRpcResponse, RequestArguments, RpcError, RpcPayload, RpcResponsePayload,
    ETH_ACCOUNTS, ETH_REQUEST_ACCOUNTS,
};
use crate::indirection::Indirection;
use crate::ports::{Eip1193Provider, ProviderChoice, ProviderChooser, RpcEngine};
use crate::state_machine::ProviderStateMachine;

/// Lets an `eth_requestAccounts` call be handed to a competing provider
/// after the user picks it.
pub struct EscapeHatch {
    pub candidate: Arc<dyn Eip1193Provider>,
    pub indirection: Indirection<dyn Eip1193Provider>,
    pub chooser: Arc<dyn ProviderChooser>,
}

#[derive(Clone)]
pub struct RpcDispatcher {
    engine: Arc<dyn RpcEngine>,
    state: ProviderStateMachine,
    jsonrpc_version: String,
    next_id: Arc<AtomicU64>,
    escape_hatch: Arc<Mutex<Option<Arc<EscapeHatch>>>>,
}

impl RpcDispatcher {
    pub fn new(
        engine: Arc<dyn RpcEngine>,
        state: ProviderStateMachine,
        jsonrpc_version: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            state,
            jsonrpc_version: jsonrpc_version.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            escape_hatch: Arc::new(Mutex::new(None)),
        }
    }

    pub fn arm_escape_hatch(&self, hatch: EscapeHatch) {
        *self
            .escape_hatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hatch));
    }

    pub fn disarm_escape_hatch(&self) {
        *self
            .escape_hatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn escape_hatch_armed(&self) -> bool {
        self.current_hatch().is_some()
    }

    fn current_hatch(&self) -> Option<Arc<EscapeHatch>> {
        self.escape_hatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn tag(&self, mut request: JsonRpcRequest) -> JsonRpcRequest {
        if request.jsonrpc.is_none() {
            request.jsonrpc = Some(self.jsonrpc_version.clone());
        }
        if request.id.is_none() {
            request.id = Some(Value::from(self.next_id.fetch_add(1, Ordering::Relaxed)));
        }
        request
    }

    pub async fn submit(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError> {
        match payload {
            RpcPayload::Single(request) => self
                .submit_single(request)
                .await
                .map(RpcResponsePayload::Single),
            RpcPayload::Batch(requests) => {
                let requests = requests.into_iter().map(|r| self.tag(r)).collect();
                self.engine.handle(RpcPayload::Batch(requests)).await
            }
        }
    }

    pub async fn submit_single(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let request = self.tag(request);

        if request.method == ETH_REQUEST_ACCOUNTS {
            if let Some(hatch) = self.current_hatch() {
                if hatch.chooser.choose().await? == ProviderChoice::Other {
                    return Ok(self.defer_to_candidate(&hatch, request).await);
                }
            }
        }

        let is_passive = match request.method.as_str() {
            ETH_ACCOUNTS => Some(true),
            ETH_REQUEST_ACCOUNTS => Some(false),
            _ => None,
        };

        let outcome = match self.engine.handle(RpcPayload::Single(request)).await {
            Ok(RpcResponsePayload::Single(response)) => Ok(response),
            Ok(RpcResponsePayload::Batch(_)) => Err(RpcError::internal(
                "engine answered a single request with a batch",
            )),
            Err(err) => Err(err),
        };

        if let Some(is_passive) = is_passive {
            let accounts = match &outcome {
                Ok(JsonRpcResponse {
                    result: Some(result),
                    error: None,
                    ..
                }) => result.clone(),
                _ => Value::Array(Vec::new()),
            };
            self.state.handle_accounts_changed(&accounts, is_passive);
        }

        outcome
    }

    /// Hands the call to the competing provider; this engine never sees it.
    async fn defer_to_candidate(
        &self,
        hatch: &EscapeHatch,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        info!(method = %request.method, "user selected the competing provider; retargeting");
        hatch.indirection.assign_delegate(Arc::clone(&hatch.candidate));
        let id = request.id.clone().unwrap_or(Value::Null);
        let args = RequestArguments::new(request.method, request.params).to_value();
        let outcome = hatch.candidate.request(args).await;
        debug!(ok = outcome.is_ok(), "competing provider answered deferred call");
        JsonRpcResponse::from_outcome(id, outcome)
    }
}
