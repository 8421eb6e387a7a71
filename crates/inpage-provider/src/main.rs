//! inpage-provider: install an EIP-1193 provider against a wallet backend and exercise it

use std::sync::Arc;

use eyre::WrapErr;
use serde_json::{json, Value};

use inpage_provider_adapters::{
    engine_from_config, InMemoryGlobalScope, ProviderConfig, StaticChooser, TokioTimerAdapter,
};
use inpage_provider_core::{
    Eip1193Provider, EventKind, GlobalInstaller, InpageProvider, ProviderChoice, ProviderChooser,
    ProviderEvent,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let method = args.next().unwrap_or_else(|| "eth_requestAccounts".to_owned());
    let params = match args.next() {
        Some(raw) => Some(
            serde_json::from_str::<Value>(&raw).wrap_err("params must be valid JSON")?,
        ),
        None => None,
    };

    let config = ProviderConfig::from_env();
    tracing::info!(profile = ?config.runtime_profile, "Starting inpage-provider");

    let provider = Arc::new(InpageProvider::new(
        engine_from_config(&config),
        config.provider_options(),
    ));
    for kind in EventKind::ALL {
        provider.on(kind, Arc::new(log_event));
    }
    provider
        .initialize_from_backend()
        .await
        .wrap_err("provider initialization failed")?;

    let installer = GlobalInstaller::new(
        Arc::new(InMemoryGlobalScope::default()),
        TokioTimerAdapter,
        config.installer_options(),
    );
    let chooser: Arc<dyn ProviderChooser> = Arc::new(StaticChooser::new(ProviderChoice::This));
    let installation = installer
        .install(Arc::clone(&provider), Some(chooser))
        .await
        .wrap_err("failed to install provider")?;
    tracing::info!(mode = ?installation.mode(), "provider installed");

    let handle = installation.global_handle();
    let mut request = json!({ "method": method });
    if let Some(params) = params {
        request["params"] = params;
    }
    let result = handle
        .request(request)
        .await
        .wrap_err_with(|| format!("{method} failed"))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    tracing::info!(
        chain_id = ?handle.chain_id(),
        selected_address = ?handle.selected_address(),
        connected = handle.is_connected(),
        "final provider state"
    );
    Ok(())
}

fn log_event(event: &ProviderEvent) {
    tracing::info!(event = %event.kind(), ?event, "provider event");
}
