pub mod dispatcher;
pub mod domain;
pub mod events;
pub mod indirection;
pub mod installer;
pub mod ports;
pub mod provider;
pub mod state_machine;
pub mod validator;

pub use dispatcher::{EscapeHatch, RpcDispatcher};
pub use domain::{
    is_valid_chain_id, BackendNotification, EventKind, InitialSnapshot, JsonRpcRequest,
    JsonRpcResponse, ProviderEvent, ProviderPhase, RequestArguments, RpcError, RpcPayload,
    RpcResponsePayload, ETH_ACCOUNTS, ETH_REQUEST_ACCOUNTS, JSONRPC_VERSION,
};
pub use events::{EventEmitter, Listener, ListenerId};
pub use indirection::{Indirection, IndirectionError};
pub use installer::{GlobalInstaller, InstallError, InstallMode, Installation, InstallerOptions};
pub use ports::{
    same_provider, Eip1193Provider, GlobalScope, PortError, ProviderChoice, ProviderChooser,
    RpcEngine, SlotValue, TimerPort,
};
pub use provider::{InpageProvider, ProviderOptions, IDENTITY_FLAG};
pub use state_machine::{ProviderError, ProviderState, ProviderStateMachine};
pub use validator::validate_request_args;
