//! Process wiring: logger, durable role store, coordinator with its event
//! loop and periodic audit, and the feed relay on top.

use std::sync::Arc;

use market::manager::QuoteBook;
use roles::coordinator::TabRoleCoordinator;
use roles::registry::{TabEvent, TabRegistry};
use roles::store::SqliteRoleStore;
use router::EventRouter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::recent::RecentEvents;
use crate::relay::FeedRelay;
use crate::sink::EventSink;

/// Capacity of the tab lifecycle channel.
const TAB_EVENT_CAPACITY: usize = 256;

pub struct RelayApp<R: TabRegistry, K: EventSink> {
    pub coordinator: Arc<TabRoleCoordinator<SqliteRoleStore, R>>,
    pub relay: Arc<FeedRelay<SqliteRoleStore, R, K>>,
    /// Feed the registry's close/update callbacks in here.
    pub tab_events: mpsc::Sender<TabEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl<R: TabRegistry, K: EventSink> RelayApp<R, K> {
    pub async fn start(cfg: &AppConfig, registry: Arc<R>, sink: Arc<K>) -> anyhow::Result<Self> {
        common::logger::init_logger("tabrelay", cfg.log_json);

        let store = Arc::new(SqliteRoleStore::new(&cfg.database_url).await?);
        let coordinator = TabRoleCoordinator::start(cfg.coordinator.clone(), store, registry).await;

        let (tab_events, rx) = mpsc::channel(TAB_EVENT_CAPACITY);
        let tasks = vec![
            tokio::spawn(coordinator.clone().run(rx)),
            coordinator.spawn_audit_loop(),
        ];

        let relay = Arc::new(FeedRelay::new(
            QuoteBook::new(cfg.history),
            EventRouter::new(coordinator.clone()),
            sink,
            RecentEvents::new(cfg.recent_events),
        ));

        info!(database = %cfg.database_url, "relay started");

        Ok(Self {
            coordinator,
            relay,
            tab_events,
            tasks,
        })
    }

    /// Stop the background tasks. Persisted role state is left as is.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("relay stopped");
    }
}
