use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use inpage_provider_core::{PortError, ProviderChoice, ProviderChooser};

/// Answers every prompt with the same choice.
#[derive(Debug)]
pub struct StaticChooser {
    choice: ProviderChoice,
    prompts: AtomicUsize,
}

impl StaticChooser {
    pub fn new(choice: ProviderChoice) -> Self {
        Self {
            choice,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderChooser for StaticChooser {
    async fn choose(&self) -> Result<ProviderChoice, PortError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.choice)
    }
}
