use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Passive read: returns already-authorized accounts without prompting.
pub const ETH_ACCOUNTS: &str = "eth_accounts";
/// Active request: may prompt the user for authorization.
pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const ETH_SUBSCRIPTION: &str = "eth_subscription";
pub const GET_PROVIDER_STATE: &str = "wallet_getProviderState";

pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    pub const TRY_AGAIN_LATER: i64 = 1013;
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("the method {method} does not exist / is not available"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    /// Recoverable disconnection: the backend may come back on its own.
    pub fn try_again_later(message: impl Into<String>) -> Self {
        Self::new(codes::TRY_AGAIN_LATER, message)
    }

    pub fn is_recoverable_disconnect(&self) -> bool {
        self.code == codes::TRY_AGAIN_LATER
    }
}

/// Normalized `{method, params}` pair accepted by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("method".to_owned(), Value::String(self.method.clone()));
        if let Some(params) = &self.params {
            obj.insert("params".to_owned(), params.clone());
        }
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl From<RequestArguments> for JsonRpcRequest {
    fn from(args: RequestArguments) -> Self {
        Self {
            jsonrpc: None,
            id: None,
            method: args.method,
            params: args.params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_owned()
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_outcome(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A single call or a batch, forwarded to the engine as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcPayload {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponsePayload {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Hydration data handed to `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialSnapshot {
    pub accounts: Value,
    pub chain_id: String,
    pub is_unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_hint: Option<String>,
}

/// Notifications pushed by the wallet backend over the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BackendNotification {
    #[serde(rename = "connect", rename_all = "camelCase")]
    Connect { chain_id: String },
    #[serde(rename = "disconnect", rename_all = "camelCase")]
    Disconnect {
        is_recoverable: bool,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(rename = "chainChanged", rename_all = "camelCase")]
    ChainChanged {
        chain_id: String,
        #[serde(default)]
        network_hint: Option<String>,
    },
    #[serde(rename = "accountsChanged")]
    AccountsChanged { accounts: Value },
    #[serde(rename = "unlockStateChanged", rename_all = "camelCase")]
    UnlockStateChanged {
        #[serde(default)]
        accounts: Option<Value>,
        is_unlocked: Value,
    },
    #[serde(rename = "eth_subscription")]
    Subscription { subscription: String, result: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connect,
    Disconnect,
    ChainChanged,
    AccountsChanged,
    Message,
    Initialized,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::ChainChanged,
        EventKind::AccountsChanged,
        EventKind::Message,
        EventKind::Initialized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::ChainChanged => "chainChanged",
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::Message => "message",
            EventKind::Initialized => "_initialized",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown provider event: {s}"))
    }
}

/// Events delivered to page listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Connect { chain_id: String },
    Disconnect { error: RpcError },
    ChainChanged(String),
    AccountsChanged(Vec<String>),
    Message { kind: String, data: Value },
    /// One-shot signal raised once hydration has finished.
    Initialized,
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::Connect { .. } => EventKind::Connect,
            ProviderEvent::Disconnect { .. } => EventKind::Disconnect,
            ProviderEvent::ChainChanged(_) => EventKind::ChainChanged,
            ProviderEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            ProviderEvent::Message { .. } => EventKind::Message,
            ProviderEvent::Initialized => EventKind::Initialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    Uninitialized,
    Initializing,
    Active,
    PermanentlyDisconnected,
}

/// `0x`-prefixed hex that fits in 256 bits.
pub fn is_valid_chain_id(raw: &str) -> bool {
    let Some(digits) = raw.strip_prefix("0x") else {
        return false;
    };
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_hexdigit())
        && U256::from_str_radix(digits, 16).is_ok()
}

/// Backends report `"loading"` while they have no network yet.
pub fn normalize_network_version(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "loading" {
        None
    } else {
        Some(raw.to_owned())
    }
}
