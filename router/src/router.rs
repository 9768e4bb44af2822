//! Event routing from the primary tab to matching secondaries.
//!
//! For each event:
//!   1. Events without an instrument are dropped (nothing to match on).
//!   2. Every secondary is liveness-checked; dead ones are queued for removal.
//!   3. Live secondaries showing the same instrument get the event.
//!   4. A closed channel queues the tab for removal; other delivery errors
//!      are logged and the tab stays registered.
//!   5. Queued removals go through the coordinator in one locked pass with a
//!      single persist.

use std::sync::Arc;

use market::types::MarketEvent;
use roles::coordinator::TabRoleCoordinator;
use roles::model::TabId;
use roles::registry::{NotifyOutcome, TabMessage, TabRegistry};
use roles::store::RoleStore;
use tracing::{debug, info, instrument, warn};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Tabs the event was delivered to.
    pub delivered: Vec<TabId>,
    /// Live tabs showing another instrument.
    pub skipped: usize,
    /// Tabs removed from the secondary set.
    pub pruned: Vec<TabId>,
    /// Tabs with a transient delivery failure.
    pub failed: Vec<TabId>,
}

pub struct EventRouter<S: RoleStore, R: TabRegistry> {
    coordinator: Arc<TabRoleCoordinator<S, R>>,
}

impl<S: RoleStore, R: TabRegistry> EventRouter<S, R> {
    pub fn new(coordinator: Arc<TabRoleCoordinator<S, R>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<TabRoleCoordinator<S, R>> {
        &self.coordinator
    }

    #[instrument(
        skip(self, event),
        target = "router",
        fields(instrument = ?event.instrument().map(|i| i.key.as_str()))
    )]
    pub async fn broadcast(&self, event: &MarketEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let Some(target) = event.instrument() else {
            debug!("event carries no instrument; not routed");
            return report;
        };

        let secondaries = self.coordinator.secondaries().await;
        if secondaries.is_empty() {
            return report;
        }

        let message = TabMessage::Feed {
            event: event.clone(),
        };
        let mut unreachable = Vec::new();

        for (tab_id, instrument) in secondaries {
            if !self.coordinator.is_tab_alive(&tab_id).await {
                debug!(tab_id = %tab_id, "secondary gone");
                unreachable.push(tab_id);
                continue;
            }

            if instrument.as_ref() != Some(target) {
                report.skipped += 1;
                continue;
            }

            match self.coordinator.notify_tab(&tab_id, &message).await {
                NotifyOutcome::Delivered => report.delivered.push(tab_id),
                NotifyOutcome::ChannelClosed => {
                    debug!(tab_id = %tab_id, "channel closed mid-broadcast");
                    unreachable.push(tab_id);
                }
                NotifyOutcome::Failed(reason) => {
                    warn!(component = "router", tab_id = %tab_id, reason = %reason, "delivery failed; tab kept");
                    report.failed.push(tab_id);
                }
            }
        }

        if !unreachable.is_empty() {
            let removed = self.coordinator.prune_secondaries(&unreachable).await;
            info!(
                component = "router",
                removed = removed.len(),
                queued = unreachable.len(),
                "pruned unreachable secondaries"
            );
            report.pruned = removed;
        }

        report
    }
}
