use inpage_provider_core::{InstallerOptions, ProviderOptions, JSONRPC_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

impl RuntimeProfile {
    fn from_env_value(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => RuntimeProfile::Production,
            _ => RuntimeProfile::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub runtime_profile: RuntimeProfile,
    pub backend_proxy_url: Option<String>,
    pub request_timeout_ms: u64,
    pub global_slot_name: String,
    pub initialized_event_name: String,
    pub conflict_poll_attempts: u32,
    pub conflict_poll_interval_ms: u64,
    pub max_event_listeners: usize,
    pub jsonrpc_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            backend_proxy_url: None,
            request_timeout_ms: 15_000,
            global_slot_name: "ethereum".to_owned(),
            initialized_event_name: "ethereum#initialized".to_owned(),
            conflict_poll_attempts: 10,
            conflict_poll_interval_ms: 100,
            max_event_listeners: 100,
            jsonrpc_version: JSONRPC_VERSION.to_owned(),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("INPAGE_PROVIDER_PROFILE") {
            cfg.runtime_profile = RuntimeProfile::from_env_value(&v);
        }
        if let Ok(v) = std::env::var("INPAGE_PROVIDER_PROXY_URL") {
            if !v.trim().is_empty() {
                cfg.backend_proxy_url = Some(v.trim().to_owned());
            }
        }
        if let Some(v) = env_parse("INPAGE_PROVIDER_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout_ms = v;
        }
        if let Ok(v) = std::env::var("INPAGE_PROVIDER_SLOT") {
            cfg.global_slot_name = v;
        }
        if let Ok(v) = std::env::var("INPAGE_PROVIDER_INITIALIZED_EVENT") {
            cfg.initialized_event_name = v;
        }
        if let Some(v) = env_parse("INPAGE_PROVIDER_CONFLICT_POLL_ATTEMPTS") {
            cfg.conflict_poll_attempts = v;
        }
        if let Some(v) = env_parse("INPAGE_PROVIDER_CONFLICT_POLL_INTERVAL_MS") {
            cfg.conflict_poll_interval_ms = v;
        }
        if let Some(v) = env_parse("INPAGE_PROVIDER_MAX_EVENT_LISTENERS") {
            cfg.max_event_listeners = v;
        }
        cfg
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            max_event_listeners: self.max_event_listeners,
            jsonrpc_version: self.jsonrpc_version.clone(),
        }
    }

    pub fn installer_options(&self) -> InstallerOptions {
        InstallerOptions {
            slot_name: self.global_slot_name.clone(),
            initialized_event: self.initialized_event_name.clone(),
            conflict_poll_attempts: self.conflict_poll_attempts,
            conflict_poll_interval_ms: self.conflict_poll_interval_ms,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}
