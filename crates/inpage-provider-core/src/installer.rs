use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatcher::EscapeHatch;
use crate::indirection::{Indirection, IndirectionError};
use crate::ports::{
    same_provider, Eip1193Provider, GlobalScope, PortError, ProviderChooser, SlotValue, TimerPort,
};
use crate::provider::InpageProvider;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("global scope error: {0}")]
    Scope(#[from] PortError),
    #[error("indirection error: {0}")]
    Indirection(#[from] IndirectionError),
}

#[derive(Debug, Clone)]
pub struct InstallerOptions {
    pub slot_name: String,
    pub initialized_event: String,
    pub conflict_poll_attempts: u32,
    pub conflict_poll_interval_ms: u64,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            slot_name: "ethereum".to_owned(),
            initialized_event: "ethereum#initialized".to_owned(),
            conflict_poll_attempts: 10,
            conflict_poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// The provider itself sits in a sealed slot.
    Direct,
    /// An indirection sits in the slot, fronting this provider until retargeted.
    Indirect,
}

/// Claims the global provider slot at startup.
pub struct GlobalInstaller<G, T>
where
    G: GlobalScope + 'static,
    T: TimerPort,
{
    scope: Arc<G>,
    timer: T,
    options: InstallerOptions,
}

impl<G, T> GlobalInstaller<G, T>
where
    G: GlobalScope + 'static,
    T: TimerPort,
{
    pub fn new(scope: Arc<G>, timer: T, options: InstallerOptions) -> Self {
        Self {
            scope,
            timer,
            options,
        }
    }

    pub async fn install(
        &self,
        provider: Arc<InpageProvider>,
        chooser: Option<Arc<dyn ProviderChooser>>,
    ) -> Result<Installation<G>, InstallError> {
        let ours: Arc<dyn Eip1193Provider> = provider.clone();
        let attempts = self.options.conflict_poll_attempts.max(1);

        for attempt in 1..=attempts {
            if let Some(foreign) = self.detect_conflict(&ours)? {
                info!(
                    attempt,
                    slot = %self.options.slot_name,
                    "competing provider detected; installing indirection"
                );
                return self.install_indirect(provider, ours, foreign, chooser);
            }
            if attempt < attempts {
                self.timer
                    .sleep_ms(self.options.conflict_poll_interval_ms)
                    .await;
            }
        }

        self.install_direct(ours)
    }

    fn detect_conflict(
        &self,
        ours: &Arc<dyn Eip1193Provider>,
    ) -> Result<Option<Arc<dyn Eip1193Provider>>, InstallError> {
        match self.scope.get_slot(&self.options.slot_name)? {
            Some(SlotValue::Provider(existing)) if !same_provider(&existing, ours) => {
                Ok(Some(existing))
            }
            Some(SlotValue::Data(value)) => {
                debug!(%value, "slot holds a non-provider value; not a conflict");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn install_direct(
        &self,
        ours: Arc<dyn Eip1193Provider>,
    ) -> Result<Installation<G>, InstallError> {
        let slot = &self.options.slot_name;
        self.scope
            .set_slot(slot, SlotValue::Provider(Arc::clone(&ours)))?;
        self.scope.seal_slot(slot)?;
        self.scope.dispatch_event(&self.options.initialized_event)?;
        info!(slot = %slot, "provider installed and slot sealed");

        Ok(Installation {
            mode: InstallMode::Direct,
            scope: Arc::clone(&self.scope),
            slot_name: slot.clone(),
            handle: ours,
            indirection: None,
            competing: None,
        })
    }

    fn install_indirect(
        &self,
        provider: Arc<InpageProvider>,
        ours: Arc<dyn Eip1193Provider>,
        foreign: Arc<dyn Eip1193Provider>,
        chooser: Option<Arc<dyn ProviderChooser>>,
    ) -> Result<Installation<G>, InstallError> {
        let indirection: Indirection<dyn Eip1193Provider> = Indirection::new(ours);

        let scope = Arc::clone(&self.scope);
        let event = self.options.initialized_event.clone();
        indirection.on_retarget(move || {
            if let Err(e) = scope.dispatch_event(&event) {
                warn!(error = %e, "failed to re-dispatch provider initialized event");
            }
        });

        if let Some(chooser) = chooser {
            provider.dispatcher().arm_escape_hatch(EscapeHatch {
                candidate: Arc::clone(&foreign),
                indirection: indirection.clone(),
                chooser,
            });
        }

        let handle: Arc<dyn Eip1193Provider> = Arc::new(indirection.clone());
        let slot = &self.options.slot_name;
        self.scope
            .set_slot(slot, SlotValue::Provider(Arc::clone(&handle)))?;
        self.scope.dispatch_event(&self.options.initialized_event)?;

        Ok(Installation {
            mode: InstallMode::Indirect,
            scope: Arc::clone(&self.scope),
            slot_name: slot.clone(),
            handle,
            indirection: Some(indirection),
            competing: Some(foreign),
        })
    }
}

pub struct Installation<G: GlobalScope> {
    mode: InstallMode,
    scope: Arc<G>,
    slot_name: String,
    handle: Arc<dyn Eip1193Provider>,
    indirection: Option<Indirection<dyn Eip1193Provider>>,
    competing: Option<Arc<dyn Eip1193Provider>>,
}

impl<G: GlobalScope> Installation<G> {
    pub fn mode(&self) -> InstallMode {
        self.mode
    }

    /// What page code finds in the global slot.
    pub fn global_handle(&self) -> Arc<dyn Eip1193Provider> {
        Arc::clone(&self.handle)
    }

    pub fn indirection(&self) -> Option<&Indirection<dyn Eip1193Provider>> {
        self.indirection.as_ref()
    }

    pub fn competing_provider(&self) -> Option<&Arc<dyn Eip1193Provider>> {
        self.competing.as_ref()
    }

    /// Called when the slot may have been overwritten. If another provider
    /// took the slot, the indirection is retargeted to it and put back, so
    /// held handles follow the provider that asserted itself last.
    pub fn reconcile(&self) -> Result<bool, InstallError> {
        let Some(indirection) = &self.indirection else {
            return Ok(false);
        };
        let Some(current) = self.scope.get_slot(&self.slot_name)? else {
            return Ok(false);
        };
        if current.is_provider(&self.handle) {
            return Ok(false);
        }
        if let Err(e) = indirection.assign_from_slot(&current) {
            warn!(error = %e, slot = %self.slot_name, "slot overwritten with a non-provider");
            return Ok(false);
        }
        self.scope
            .set_slot(&self.slot_name, SlotValue::Provider(Arc::clone(&self.handle)))?;
        info!(slot = %self.slot_name, "competing provider re-asserted itself; retargeted");
        Ok(true)
    }
}
