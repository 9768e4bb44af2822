use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use market::types::InstrumentRef;
use roles::config::CoordinatorConfig;
use roles::coordinator::TabRoleCoordinator;
use roles::model::{Role, RoleState, TabId, TabRecord};
use roles::registry::{NotifyOutcome, TabFilter, TabMessage, TabRegistry};
use roles::store::RoleStore;
use roles::store::sqlite_store::SqliteRoleStore;

/// Fixed set of open tabs.
struct OpenTabs(Vec<TabId>);

#[async_trait]
impl TabRegistry for OpenTabs {
    async fn is_alive(&self, tab_id: &TabId) -> anyhow::Result<bool> {
        Ok(self.0.contains(tab_id))
    }

    async fn query_all(&self, _filter: &TabFilter) -> anyhow::Result<Vec<TabId>> {
        Ok(self.0.clone())
    }

    async fn notify(&self, _tab_id: &TabId, _message: &TabMessage) -> NotifyOutcome {
        NotifyOutcome::Delivered
    }
}

///
/// SqliteRoleStore against an in-memory database:
///   · empty database loads as None
///   · save + load round trip, including routing metadata
///   · save overwrites the single document
///   · clear removes it
///   · a coordinator restored from the store sees the same state
///
async fn store() -> anyhow::Result<SqliteRoleStore> {
    // one connection, or every connection gets its own :memory: database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    let store = SqliteRoleStore::from_pool(pool);
    store.migrate().await?;
    Ok(store)
}

fn sample_state() -> RoleState {
    let mut state = RoleState {
        primary_tab_id: Some(TabId::from(11u64)),
        ..Default::default()
    };
    state
        .tab_records
        .insert(TabId::from(11u64), TabRecord::new(Role::Primary, 1_000));

    let mut record = TabRecord::new(Role::Secondary, 2_000);
    record.instrument = Some(InstrumentRef::new("918422", "NVIDIA"));
    state.secondary_tab_ids.insert(TabId::from(12u64));
    state.tab_records.insert(TabId::from(12u64), record);
    state
}

#[tokio::test]
async fn empty_database_loads_none() -> anyhow::Result<()> {
    let store = store().await?;
    assert_eq!(store.load().await?, None);
    Ok(())
}

#[tokio::test]
async fn save_then_load_round_trips() -> anyhow::Result<()> {
    let store = store().await?;
    let state = sample_state();

    store.save(&state).await?;

    assert_eq!(store.load().await?, Some(state));
    Ok(())
}

#[tokio::test]
async fn save_overwrites_previous_document() -> anyhow::Result<()> {
    let store = store().await?;
    store.save(&sample_state()).await?;

    let empty = RoleState::default();
    store.save(&empty).await?;

    assert_eq!(store.load().await?, Some(empty));
    Ok(())
}

#[tokio::test]
async fn clear_removes_document() -> anyhow::Result<()> {
    let store = store().await?;
    store.save(&sample_state()).await?;

    store.clear().await?;

    assert_eq!(store.load().await?, None);
    Ok(())
}

#[tokio::test]
async fn migrate_is_idempotent() -> anyhow::Result<()> {
    let store = store().await?;
    store.save(&sample_state()).await?;

    store.migrate().await?;

    assert_eq!(store.load().await?, Some(sample_state()));
    Ok(())
}

#[tokio::test]
async fn coordinator_restores_from_sqlite() -> anyhow::Result<()> {
    let store = Arc::new(store().await?);
    store.save(&sample_state()).await?;

    let registry = Arc::new(OpenTabs(vec![TabId::from(11u64), TabId::from(12u64)]));
    let coord = TabRoleCoordinator::start(CoordinatorConfig::default(), store.clone(), registry).await;

    assert_eq!(coord.status().await, sample_state());

    let decision = coord.assign_role(&TabId::from(13u64)).await;
    assert_eq!(decision.role, Role::Secondary);

    let persisted = store.load().await?.unwrap_or_default();
    assert!(persisted.secondary_tab_ids.contains(&TabId::from(13u64)));
    Ok(())
}

#[tokio::test]
async fn new_opens_and_migrates() -> anyhow::Result<()> {
    let store = SqliteRoleStore::new("sqlite::memory:").await?;

    store.save(&sample_state()).await?;

    assert_eq!(store.load().await?, Some(sample_state()));
    Ok(())
}
