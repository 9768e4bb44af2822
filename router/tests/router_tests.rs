use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use market::types::{InstrumentRef, MarketEvent, Side};
use roles::config::CoordinatorConfig;
use roles::coordinator::TabRoleCoordinator;
use roles::model::TabId;
use roles::registry::TabMessage;
use roles::store::MemoryRoleStore;
use router::{BroadcastReport, EventRouter};

use mock_registry::MockTabRegistry;

type Router = EventRouter<MemoryRoleStore, MockTabRegistry>;

fn tab(n: u64) -> TabId {
    TabId::from(n)
}

fn nvda() -> InstrumentRef {
    InstrumentRef::new("918422", "NVIDIA")
}

fn sap() -> InstrumentRef {
    InstrumentRef::new("716460", "SAP")
}

fn trade(instrument: Option<InstrumentRef>) -> MarketEvent {
    MarketEvent::Trade {
        instrument,
        price: 120.5,
        size: 10.0,
        ts_ms: 1_000,
        side: Side::Buy,
    }
}

/// Tab 1 is primary; tabs 2.. are secondaries showing `views[i]`.
async fn setup(
    views: &[Option<InstrumentRef>],
) -> (Router, Arc<MemoryRoleStore>, Arc<MockTabRegistry>) {
    let n = views.len() as u64;
    let store = Arc::new(MemoryRoleStore::default());
    let registry = Arc::new(MockTabRegistry::with_alive(1..=n + 1));
    let coord = TabRoleCoordinator::start(CoordinatorConfig::default(), store.clone(), registry.clone()).await;

    coord.assign_role(&tab(1)).await;
    for (i, view) in views.iter().enumerate() {
        let id = tab(i as u64 + 2);
        coord.assign_role(&id).await;
        coord.set_instrument(&id, view.clone()).await;
    }

    (EventRouter::new(coord), store, registry)
}

#[tokio::test]
async fn delivers_only_to_matching_instrument() -> anyhow::Result<()> {
    let (router, _, registry) = setup(&[Some(nvda()), Some(sap()), None, Some(nvda())]).await;
    let event = trade(Some(nvda()));

    let report = router.broadcast(&event).await;

    assert_eq!(report.delivered, vec![tab(2), tab(5)]);
    assert_eq!(report.skipped, 2);
    assert!(report.pruned.is_empty());
    assert_eq!(registry.sent_to(2), vec![TabMessage::Feed { event }]);
    assert!(registry.sent_to(1).is_empty());
    assert!(registry.sent_to(3).is_empty());

    // skipped tabs stay registered
    assert_eq!(router.coordinator().status().await.secondary_tab_ids.len(), 4);
    Ok(())
}

#[tokio::test]
async fn events_without_instrument_are_not_routed() -> anyhow::Result<()> {
    let (router, _, registry) = setup(&[Some(nvda())]).await;

    let report = router.broadcast(&trade(None)).await;

    assert_eq!(report, BroadcastReport::default());
    assert!(registry.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn dead_secondaries_are_pruned_with_one_persist() -> anyhow::Result<()> {
    let (router, store, registry) = setup(&[Some(nvda()), Some(sap()), Some(nvda())]).await;
    registry.close(2);
    registry.close(3);
    let saves = store.saves();

    let report = router.broadcast(&trade(Some(nvda()))).await;

    assert_eq!(report.delivered, vec![tab(4)]);
    assert_eq!(report.pruned, vec![tab(2), tab(3)]);
    assert_eq!(store.saves(), saves + 1);

    let status = router.coordinator().status().await;
    assert_eq!(status.secondary_tab_ids.iter().cloned().collect::<Vec<_>>(), vec![tab(4)]);
    assert!(!status.tab_records.contains_key(&tab(2)));
    assert_eq!(store.snapshot().await, Some(status));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pruned_lists_only_tabs_actually_removed() -> anyhow::Result<()> {
    let (router, store, registry) = setup(&[Some(nvda())]).await;
    registry.close(2);
    registry.set_liveness_delay(Duration::from_millis(100));
    let saves = store.saves();

    // tab 2 closes while the broadcast is still checking it
    let msg = trade(Some(nvda()));
    let (report, _) = tokio::join!(router.broadcast(&msg), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        router.coordinator().on_tab_closed(&tab(2)).await;
    });

    assert!(report.pruned.is_empty());
    assert!(report.delivered.is_empty());
    assert_eq!(store.saves(), saves + 1);
    assert_eq!(router.coordinator().role_of(&tab(2)).await, None);
    Ok(())
}

#[tokio::test]
async fn closed_channel_is_pruned() -> anyhow::Result<()> {
    let (router, _, registry) = setup(&[Some(nvda()), Some(nvda())]).await;
    registry.close_channel(2);

    let report = router.broadcast(&trade(Some(nvda()))).await;

    assert_eq!(report.delivered, vec![tab(3)]);
    assert_eq!(report.pruned, vec![tab(2)]);
    assert_eq!(router.coordinator().role_of(&tab(2)).await, None);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn transient_failure_keeps_tab() {
    let (router, store, registry) = setup(&[Some(nvda())]).await;
    registry.fail_notify(2);
    let saves = store.saves();

    let report = router.broadcast(&trade(Some(nvda()))).await;

    assert_eq!(report.failed, vec![tab(2)]);
    assert!(report.pruned.is_empty());
    assert_eq!(store.saves(), saves);
    assert!(router.coordinator().role_of(&tab(2)).await.is_some());
    assert!(logs_contain("delivery failed; tab kept"));
}

#[tokio::test]
async fn nothing_to_do_without_secondaries() -> anyhow::Result<()> {
    let (router, store, registry) = setup(&[]).await;
    let saves = store.saves();

    let report = router.broadcast(&trade(Some(sap()))).await;

    assert_eq!(report, BroadcastReport::default());
    assert!(registry.sent().is_empty());
    assert_eq!(store.saves(), saves);
    Ok(())
}
