use async_trait::async_trait;
use market::types::{InstrumentRef, MarketEvent};
use serde::{Deserialize, Serialize};

use crate::model::TabId;

/// Narrows `query_all` to the tabs this relay cares about.
#[derive(Debug, Clone, Default)]
pub struct TabFilter {
    /// Match pattern understood by the registry, e.g. `https://www.ls-tc.de/*`.
    pub url_pattern: Option<String>,
}

/// Result of delivering a message to a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// The tab closed or navigated away; its receiving end is gone.
    ChannelClosed,
    /// Anything else. Treated as transient.
    Failed(String),
}

/// Messages the relay sends into a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabMessage {
    /// The tab was promoted and should open the feed connection.
    BecomePrimary,
    /// A market event forwarded from the primary.
    Feed { event: MarketEvent },
}

/// Tab lifecycle notifications, fed into [`crate::TabRoleCoordinator::run`].
#[derive(Debug, Clone)]
pub enum TabEvent {
    Closed(TabId),
    Updated {
        tab_id: TabId,
        instrument: Option<InstrumentRef>,
    },
}

/// The browser's tab registry.
#[async_trait]
pub trait TabRegistry: Send + Sync + 'static {
    async fn is_alive(&self, tab_id: &TabId) -> anyhow::Result<bool>;

    async fn query_all(&self, filter: &TabFilter) -> anyhow::Result<Vec<TabId>>;

    async fn notify(&self, tab_id: &TabId, message: &TabMessage) -> NotifyOutcome;
}
