use async_trait::async_trait;
use market::types::MarketEvent;

/// Downstream consumer of classified events (webhook, notifier, ...).
///
/// Errors are logged by the relay and never stop routing.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, event: &MarketEvent) -> anyhow::Result<()>;
}
