use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};

use inpage_provider_core::domain::{codes, GET_PROVIDER_STATE};
use inpage_provider_core::{
    InitialSnapshot, JsonRpcRequest, JsonRpcResponse, PortError, RpcEngine, RpcError, RpcPayload,
    RpcResponsePayload, ETH_ACCOUNTS, ETH_REQUEST_ACCOUNTS,
};

/// In-process backend with fixed answers, used when no proxy is configured
/// outside production and by tests.
#[derive(Debug, Clone)]
pub struct DeterministicBackend {
    state: Arc<Mutex<BackendState>>,
}

#[derive(Debug, Clone)]
struct BackendState {
    accounts: Vec<Address>,
    chain_id: u64,
    unlocked: bool,
    authorized: bool,
    calls: Vec<String>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            accounts: vec![Address::repeat_byte(0x11)],
            chain_id: 1,
            unlocked: true,
            authorized: false,
            calls: Vec::new(),
        }
    }
}

impl Default for DeterministicBackend {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
        }
    }
}

impl DeterministicBackend {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                accounts,
                chain_id,
                ..BackendState::default()
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BackendState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("backend lock poisoned: {e}")))
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.lock()?.accounts = accounts;
        Ok(())
    }

    pub fn set_chain_id(&self, chain_id: u64) -> Result<(), PortError> {
        self.lock()?.chain_id = chain_id;
        Ok(())
    }

    pub fn set_unlocked(&self, unlocked: bool) -> Result<(), PortError> {
        self.lock()?.unlocked = unlocked;
        Ok(())
    }

    pub fn set_authorized(&self, authorized: bool) -> Result<(), PortError> {
        self.lock()?.authorized = authorized;
        Ok(())
    }

    /// Methods received so far, in arrival order.
    pub fn calls(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.calls.clone())
    }

    pub fn snapshot(&self) -> Result<InitialSnapshot, PortError> {
        let g = self.lock()?;
        Ok(snapshot_of(&g))
    }

    fn answer(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, PortError> {
        let mut g = self.lock()?;
        g.calls.push(request.method.clone());
        let id = request.id.clone().unwrap_or(Value::Null);
        let outcome = match request.method.as_str() {
            "eth_chainId" => Ok(json!(format!("{:#x}", g.chain_id))),
            "net_version" => Ok(json!(g.chain_id.to_string())),
            ETH_ACCOUNTS => Ok(exposed_accounts(&g)),
            ETH_REQUEST_ACCOUNTS => {
                if g.unlocked {
                    g.authorized = true;
                    Ok(exposed_accounts(&g))
                } else {
                    Err(RpcError::new(codes::USER_REJECTED, "wallet is locked"))
                }
            }
            GET_PROVIDER_STATE => {
                serde_json::to_value(snapshot_of(&g)).map_err(|e| {
                    RpcError::internal(format!("provider state encode failed: {e}"))
                })
            }
            other => Err(RpcError::method_not_found(other)),
        };
        Ok(JsonRpcResponse::from_outcome(id, outcome))
    }
}

fn exposed_accounts(state: &BackendState) -> Value {
    if state.authorized && state.unlocked {
        Value::Array(
            state
                .accounts
                .iter()
                .map(|a| Value::String(alloy::hex::encode_prefixed(a.as_slice())))
                .collect(),
        )
    } else {
        Value::Array(Vec::new())
    }
}

fn snapshot_of(state: &BackendState) -> InitialSnapshot {
    InitialSnapshot {
        accounts: exposed_accounts(state),
        chain_id: format!("{:#x}", state.chain_id),
        is_unlocked: state.unlocked,
        network_hint: Some(state.chain_id.to_string()),
    }
}

#[async_trait]
impl RpcEngine for DeterministicBackend {
    async fn handle(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError> {
        match payload {
            RpcPayload::Single(request) => Ok(RpcResponsePayload::Single(self.answer(&request)?)),
            RpcPayload::Batch(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in &requests {
                    responses.push(self.answer(request)?);
                }
                Ok(RpcResponsePayload::Batch(responses))
            }
        }
    }
}
