use async_trait::async_trait;

use inpage_provider_core::{PortError, RpcEngine, RpcError, RpcPayload, RpcResponsePayload};

use crate::ProviderConfig;

/// Forwards JSON-RPC payloads to a backend proxy over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRpcEngine {
    mode: EngineMode,
}

#[derive(Debug, Clone)]
enum EngineMode {
    Disabled(String),
    Proxy(ProxyRuntime),
}

#[derive(Debug, Clone)]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRpcEngine {
    pub fn with_config(config: &ProviderConfig) -> Self {
        let mode = match config.backend_proxy_url {
            Some(ref base_url) => {
                let timeout = std::time::Duration::from_millis(config.request_timeout_ms);
                match reqwest::Client::builder().timeout(timeout).build() {
                    Ok(client) => EngineMode::Proxy(ProxyRuntime {
                        base_url: base_url.clone(),
                        client,
                    }),
                    Err(e) => EngineMode::Disabled(format!(
                        "failed to initialize rpc proxy client: {e}"
                    )),
                }
            }
            None => EngineMode::Disabled("rpc proxy URL not configured".to_owned()),
        };
        Self { mode }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            mode: EngineMode::Disabled(reason.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, EngineMode::Proxy(_))
    }
}

#[async_trait]
impl RpcEngine for HttpRpcEngine {
    async fn handle(&self, payload: RpcPayload) -> Result<RpcResponsePayload, RpcError> {
        let proxy = match &self.mode {
            EngineMode::Proxy(proxy) => proxy,
            EngineMode::Disabled(reason) => return Err(PortError::Policy(reason.clone()).into()),
        };

        let response = proxy
            .client
            .post(&proxy.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("rpc proxy request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Transport(format!("rpc proxy body read failed: {e}")))?;
        if !status.is_success() {
            return Err(
                PortError::Transport(format!("rpc proxy status {status}: {}", body.trim()))
                    .into(),
            );
        }
        serde_json::from_str(&body).map_err(|e| {
            PortError::Transport(format!("rpc proxy returned a malformed payload: {e}")).into()
        })
    }
}
