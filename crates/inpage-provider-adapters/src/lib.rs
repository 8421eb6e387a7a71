use std::sync::Arc;

use inpage_provider_core::RpcEngine;

pub mod chooser;
pub mod clock;
pub mod config;
pub mod deterministic;
pub mod http;
pub mod scope;
pub mod stream;

pub use chooser::StaticChooser;
pub use clock::TokioTimerAdapter;
pub use config::{ProviderConfig, RuntimeProfile};
pub use deterministic::DeterministicBackend;
pub use http::HttpRpcEngine;
pub use scope::InMemoryGlobalScope;
pub use stream::{pump_inbound, StreamEngine};

/// Proxy when configured; otherwise the deterministic backend, except in
/// production where a missing proxy disables every call.
pub fn engine_from_config(config: &ProviderConfig) -> Arc<dyn RpcEngine> {
    if config.backend_proxy_url.is_some() {
        Arc::new(HttpRpcEngine::with_config(config))
    } else if config.strict_runtime_required() {
        Arc::new(HttpRpcEngine::disabled(
            "rpc proxy URL not configured in production runtime profile",
        ))
    } else {
        Arc::new(DeterministicBackend::default())
    }
}
