use std::time::Duration;

use async_trait::async_trait;

use inpage_provider_core::TimerPort;

#[derive(Debug, Clone, Default)]
pub struct TokioTimerAdapter;

#[async_trait]
impl TimerPort for TokioTimerAdapter {
    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
