mod common;

use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::json;

use common::EventLog;
use inpage_provider_adapters::{
    DeterministicBackend, InMemoryGlobalScope, ProviderConfig, StaticChooser, TokioTimerAdapter,
};
use inpage_provider_core::domain::codes;
use inpage_provider_core::{
    Eip1193Provider, EventKind, GlobalInstaller, GlobalScope, InpageProvider, InstallMode,
    PortError, ProviderChoice, ProviderChooser, ProviderEvent, SlotValue, IDENTITY_FLAG,
};

const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";

fn fast_config() -> ProviderConfig {
    ProviderConfig {
        conflict_poll_attempts: 2,
        conflict_poll_interval_ms: 1,
        ..ProviderConfig::default()
    }
}

fn provider_on(backend: &DeterministicBackend, config: &ProviderConfig) -> Arc<InpageProvider> {
    Arc::new(InpageProvider::new(
        Arc::new(backend.clone()),
        config.provider_options(),
    ))
}

#[tokio::test]
async fn hydrate_install_and_authorize() {
    let config = fast_config();
    let backend = DeterministicBackend::default();
    let provider = provider_on(&backend, &config);
    let log = EventLog::attach(provider.state().emitter());

    provider.initialize_from_backend().await.expect("initialize");
    assert_eq!(
        log.events(),
        vec![
            ProviderEvent::Connect {
                chain_id: "0x1".to_owned()
            },
            ProviderEvent::ChainChanged("0x1".to_owned()),
            ProviderEvent::AccountsChanged(Vec::new()),
            ProviderEvent::Initialized,
        ]
    );
    assert!(provider.is_unlocked().await);

    let scope = Arc::new(InMemoryGlobalScope::default());
    let installer = GlobalInstaller::new(
        Arc::clone(&scope),
        TokioTimerAdapter,
        config.installer_options(),
    );
    let installation = installer
        .install(Arc::clone(&provider), None)
        .await
        .expect("install");
    assert_eq!(installation.mode(), InstallMode::Direct);
    assert!(scope.is_sealed("ethereum").expect("sealed"));
    assert_eq!(
        scope.dispatched_events().expect("events"),
        vec!["ethereum#initialized".to_owned()]
    );

    let handle = installation.global_handle();
    assert_eq!(handle.property(IDENTITY_FLAG), Some(json!(true)));
    let accounts = handle
        .request(json!({ "method": "eth_requestAccounts" }))
        .await
        .expect("request accounts");
    assert_eq!(accounts, json!([ACCOUNT]));
    assert_eq!(handle.selected_address().as_deref(), Some(ACCOUNT));

    // Passive read of the same accounts changes nothing.
    handle
        .request(json!({ "method": "eth_accounts" }))
        .await
        .expect("eth_accounts");
    assert_eq!(log.count(EventKind::AccountsChanged), 2);

    assert_eq!(
        backend.calls().expect("calls"),
        vec!["wallet_getProviderState", "eth_requestAccounts", "eth_accounts"]
    );
}

#[tokio::test]
async fn locked_wallet_rejects_enable() {
    let backend = DeterministicBackend::default();
    backend.set_unlocked(false).expect("lock");
    let provider = provider_on(&backend, &fast_config());
    provider.initialize_from_backend().await.expect("initialize");
    assert!(!provider.is_unlocked().await);

    let err = provider.enable().await.expect_err("locked");

    assert_eq!(err.code, codes::USER_REJECTED);
    assert_eq!(provider.accounts(), Some(Vec::new()));
}

#[tokio::test]
async fn backend_changes_surface_through_hydration() {
    let backend = DeterministicBackend::new(vec![Address::repeat_byte(0x42)], 10);
    let account = Address::repeat_byte(0x43);
    backend.set_accounts(vec![account]).expect("accounts");
    backend.set_chain_id(42_161).expect("chain");
    backend.set_authorized(true).expect("authorize");
    let expected = backend.snapshot().expect("snapshot");
    assert_eq!(expected.chain_id, "0xa4b1");

    let provider = provider_on(&backend, &fast_config());
    provider.initialize_from_backend().await.expect("initialize");

    assert_eq!(provider.chain_id(), Some(expected.chain_id));
    assert_eq!(provider.network_version().as_deref(), Some("42161"));
    assert_eq!(
        provider.selected_address(),
        Some(alloy::hex::encode_prefixed(account.as_slice()))
    );
}

#[tokio::test]
async fn legacy_batch_reaches_backend_unintercepted() {
    let backend = DeterministicBackend::default();
    backend.set_authorized(true).expect("authorize");
    let provider = provider_on(&backend, &fast_config());
    provider.initialize(None).expect("initialize");

    let responses = provider
        .send_batch(vec![
            json!({ "method": "eth_chainId", "id": 41 }),
            json!({ "method": "eth_accounts", "id": 42 }),
            json!({ "method": "eth_sign" }),
        ])
        .await
        .expect("batch");

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].id, json!(41));
    assert_eq!(responses[1].result, Some(json!([ACCOUNT])));
    assert_eq!(
        responses[2].error.as_ref().map(|e| e.code),
        Some(codes::METHOD_NOT_FOUND)
    );
    // Batches are not intercepted.
    assert_eq!(provider.accounts(), None);
}

#[tokio::test]
async fn competing_provider_chosen_by_user_takes_over() {
    let config = fast_config();
    let scope = Arc::new(InMemoryGlobalScope::default());

    let rival_backend = DeterministicBackend::new(vec![Address::repeat_byte(0x22)], 137);
    let rival = provider_on(&rival_backend, &config);
    rival.initialize_from_backend().await.expect("rival initialize");
    scope
        .set_slot("ethereum", SlotValue::Provider(rival.clone()))
        .expect("rival installs first");

    let backend = DeterministicBackend::default();
    let provider = provider_on(&backend, &config);
    provider.initialize_from_backend().await.expect("initialize");
    let chooser = Arc::new(StaticChooser::new(ProviderChoice::Other));
    let chooser_port: Arc<dyn ProviderChooser> = chooser.clone();
    let installer = GlobalInstaller::new(
        Arc::clone(&scope),
        TokioTimerAdapter,
        config.installer_options(),
    );
    let installation = installer
        .install(Arc::clone(&provider), Some(chooser_port))
        .await
        .expect("install");
    assert_eq!(installation.mode(), InstallMode::Indirect);
    assert!(!scope.is_sealed("ethereum").expect("sealed"));

    let handle = installation.global_handle();
    assert_eq!(handle.chain_id().as_deref(), Some("0x1"));

    let accounts = handle
        .request(json!({ "method": "eth_requestAccounts" }))
        .await
        .expect("deferred request");

    assert_eq!(
        accounts,
        json!(["0x2222222222222222222222222222222222222222"])
    );
    assert_eq!(handle.chain_id().as_deref(), Some("0x89"));
    assert_eq!(chooser.prompts(), 1);
    assert_eq!(
        backend.calls().expect("calls"),
        vec!["wallet_getProviderState"]
    );
    assert_eq!(
        scope.dispatched_events().expect("events").len(),
        2,
        "install and retarget both announce the provider"
    );
}

#[test]
fn sealed_slot_refuses_overwrites() {
    let scope = InMemoryGlobalScope::default();
    assert!(matches!(
        scope.seal_slot("ethereum"),
        Err(PortError::NotFound(_))
    ));

    scope
        .set_slot("ethereum", SlotValue::Data(json!({ "placeholder": true })))
        .expect("fill");
    scope.seal_slot("ethereum").expect("seal");

    let err = scope
        .set_slot("ethereum", SlotValue::Data(json!(null)))
        .expect_err("sealed");
    assert!(matches!(err, PortError::Policy(_)));
    assert!(matches!(
        scope.get_slot("ethereum").expect("get"),
        Some(SlotValue::Data(_))
    ));
}
