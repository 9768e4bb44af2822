//! Tab role coordination.
//!
//! Exactly one tab (the primary) holds the feed connection; every other tab
//! registered against it is a secondary and receives forwarded events.
//!
//! Guarantees:
//! - every mutation of [`RoleState`] happens under one async mutex
//! - each mutation is persisted before the lock is released
//! - role requests are served only once restoration finished (bounded wait)
//!
//! Failure handling:
//! - lock timeout: the caller gets the availability fallback (primary, connect)
//! - registry errors and timeouts: the tab is treated as dead
//! - persistence errors: logged, in-memory state stays authoritative

use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, root_span, warn_if_slow};
use common::time::now_ms;
use market::types::InstrumentRef;
use tokio::sync::{Mutex, MutexGuard, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::audit::{Violation, audit};
use crate::config::CoordinatorConfig;
use crate::error::RoleError;
use crate::model::{CoordinatorPhase, Role, RoleDecision, RoleState, TabId};
use crate::registry::{NotifyOutcome, TabEvent, TabMessage, TabRegistry};
use crate::store::RoleStore;

const SLOW_STORE: Duration = Duration::from_millis(250);
const SLOW_REGISTRY: Duration = Duration::from_millis(500);

pub struct TabRoleCoordinator<S: RoleStore, R: TabRegistry> {
    cfg: CoordinatorConfig,
    state: Mutex<RoleState>,
    phase: watch::Sender<CoordinatorPhase>,
    store: Arc<S>,
    registry: Arc<R>,
}

impl<S: RoleStore, R: TabRegistry> TabRoleCoordinator<S, R> {
    /// Build an uninitialised coordinator. Role requests wait (bounded) until
    /// [`Self::restore`] has run.
    pub fn new(cfg: CoordinatorConfig, store: Arc<S>, registry: Arc<R>) -> Arc<Self> {
        let (phase, _) = watch::channel(CoordinatorPhase::Uninitialized);

        Arc::new(Self {
            cfg,
            state: Mutex::new(RoleState::default()),
            phase,
            store,
            registry,
        })
    }

    /// Build a coordinator and restore it from the store.
    pub async fn start(cfg: CoordinatorConfig, store: Arc<S>, registry: Arc<R>) -> Arc<Self> {
        let coordinator = Self::new(cfg, store, registry);
        coordinator.restore().await;
        coordinator
    }

    pub fn phase(&self) -> CoordinatorPhase {
        *self.phase.borrow()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    /// Load the persisted state, drop tabs that are gone and repair
    /// contradictions. Runs once; later calls are no-ops.
    #[instrument(skip(self), target = "coordinator")]
    pub async fn restore(&self) {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == CoordinatorPhase::Uninitialized {
                *phase = CoordinatorPhase::Restoring;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(phase = ?self.phase(), "restore already ran");
            return;
        }

        let mut guard = self.state.lock().await;

        let mut state = match warn_if_slow("store.load", SLOW_STORE, self.store.load()).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("no persisted role state; starting empty");
                RoleState::default()
            }
            Err(e) => {
                let err = RoleError::Persistence(e.to_string());
                error!(component = "coordinator", error = %err, "role state load failed; starting empty");
                RoleState::default()
            }
        };

        let mut changed = false;

        if let Some(primary) = state.primary_tab_id.clone() {
            if !self.is_alive(&primary).await {
                info!(error = %RoleError::StaleReference(primary.clone()), "dropping stored primary");
                state.clear_primary();
                changed = true;
            }
        }

        let stored: Vec<TabId> = state.secondary_tab_ids.iter().cloned().collect();
        for tab_id in stored {
            if !self.is_alive(&tab_id).await {
                debug!(error = %RoleError::StaleReference(tab_id.clone()), "dropping stored secondary");
                state.remove_secondary(&tab_id);
                changed = true;
            }
        }

        let repaired = audit(&mut state);
        for violation in &repaired {
            warn!(
                component = "coordinator",
                error = %RoleError::IntegrityViolation(violation.to_string()),
                "repaired on restore"
            );
        }
        changed |= !repaired.is_empty();

        if changed {
            self.persist(&state).await;
        }

        info!(
            primary = ?state.primary_tab_id,
            secondaries = state.secondary_tab_ids.len(),
            changed,
            "role state restored"
        );

        *guard = state;
        drop(guard);

        self.phase.send_replace(CoordinatorPhase::Ready);
    }

    /// Decide whether `tab_id` connects to the feed (primary) or listens
    /// (secondary).
    pub async fn assign_role(self: &Arc<Self>, tab_id: &TabId) -> RoleDecision {
        let trace_id = TraceId::new();
        let span = root_span("assign_role", &trace_id);
        span.record("tab_id", tracing::field::display(tab_id));

        let decision = self.assign_role_inner(tab_id).instrument(span).await;

        if decision.error.is_none() {
            self.schedule_audit();
        }
        decision
    }

    async fn assign_role_inner(&self, tab_id: &TabId) -> RoleDecision {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "role lock not acquired; falling back to primary");
                return RoleDecision::fallback(e);
            }
        };

        let now = now_ms();

        let Some(current) = state.primary_tab_id.clone() else {
            state.set_primary(tab_id, now);
            self.persist(&state).await;
            info!(event = "primary_assigned", reason = "vacant", "primary assigned");
            return RoleDecision::primary();
        };

        if current == *tab_id {
            debug!("tab already primary");
            return RoleDecision::primary();
        }

        if !self.is_alive(&current).await {
            state.clear_primary();
            let dropped = state.clear_secondaries();
            state.set_primary(tab_id, now);
            self.persist(&state).await;
            info!(
                event = "primary_assigned",
                reason = "previous primary dead",
                previous = %current,
                dropped_secondaries = dropped,
                "primary replaced"
            );
            return RoleDecision::primary();
        }

        state.add_secondary(tab_id, now);
        self.persist(&state).await;
        debug!(event = "secondary_assigned", primary = %current, "secondary assigned");
        RoleDecision::secondary()
    }

    /// Replace the primary with the oldest live secondary, or leave the slot
    /// empty when there is none. Returns the new primary.
    #[instrument(skip(self), target = "coordinator")]
    pub async fn promote_primary(&self) -> Option<TabId> {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "promotion skipped");
                return None;
            }
        };
        self.promote_locked(&mut state).await
    }

    async fn promote_locked(&self, state: &mut RoleState) -> Option<TabId> {
        let previous = state.clear_primary();

        let mut candidates: Vec<(u64, TabId)> = state
            .secondary_tab_ids
            .iter()
            .map(|id| {
                let at = state
                    .tab_records
                    .get(id)
                    .map(|r| r.registered_at_ms)
                    .unwrap_or(u64::MAX);
                (at, id.clone())
            })
            .collect();
        candidates.sort();

        let mut chosen = None;
        for (_, tab_id) in candidates {
            if self.is_alive(&tab_id).await {
                chosen = Some(tab_id);
                break;
            }
            debug!(error = %RoleError::StaleReference(tab_id.clone()), "skipping dead candidate");
            state.remove_secondary(&tab_id);
        }

        let Some(next) = chosen else {
            self.persist(state).await;
            info!(previous = ?previous, "no live secondary; primary slot vacant");
            return None;
        };

        state.set_primary(&next, now_ms());
        self.persist(state).await;

        match self.notify_tab(&next, &TabMessage::BecomePrimary).await {
            NotifyOutcome::Delivered => {
                info!(event = "primary_promoted", previous = ?previous, tab_id = %next);
                Some(next)
            }
            NotifyOutcome::ChannelClosed => {
                // Next assign_role call takes the slot.
                state.clear_primary();
                self.persist(state).await;
                info!(error = %RoleError::ChannelClosed(next), "promotion abandoned");
                None
            }
            NotifyOutcome::Failed(reason) => {
                warn!(tab_id = %next, reason = %reason, "promotion notice failed; tab stays primary");
                Some(next)
            }
        }
    }

    /// Registry callback for a closed tab.
    #[instrument(skip(self), target = "coordinator", fields(tab_id = %tab_id))]
    pub async fn on_tab_closed(&self, tab_id: &TabId) {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "tab close not applied");
                return;
            }
        };

        if state.is_primary(tab_id) {
            self.promote_locked(&mut state).await;
        } else if state.remove_secondary(tab_id) {
            self.persist(&state).await;
            debug!("secondary removed");
        } else {
            debug!("closed tab held no role");
        }
    }

    /// Update the instrument a tab displays. Returns `false` for unknown tabs.
    #[instrument(skip(self, instrument), target = "coordinator", fields(tab_id = %tab_id))]
    pub async fn set_instrument(&self, tab_id: &TabId, instrument: Option<InstrumentRef>) -> bool {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "instrument update dropped");
                return false;
            }
        };

        let Some(record) = state.tab_records.get_mut(tab_id) else {
            debug!("no record for tab");
            return false;
        };

        if record.instrument != instrument {
            debug!(instrument = ?instrument.as_ref().map(|i| i.key.as_str()), "instrument changed");
            record.instrument = instrument;
            self.persist(&state).await;
        }
        true
    }

    /// Remove unreachable secondaries in one locked pass with a single
    /// persist. Returns the tabs actually removed; ids that are primary or
    /// no longer hold a role are left alone.
    #[instrument(skip(self, tab_ids), target = "coordinator", fields(count = tab_ids.len()))]
    pub async fn prune_secondaries(&self, tab_ids: &[TabId]) -> Vec<TabId> {
        if tab_ids.is_empty() {
            return Vec::new();
        }

        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "prune skipped");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for tab_id in tab_ids {
            if !state.is_primary(tab_id) && state.remove_secondary(tab_id) {
                removed.push(tab_id.clone());
            }
        }

        if !removed.is_empty() {
            self.persist(&state).await;
        }
        removed
    }

    /// Enforce the role-state invariants in place, persisting any repair.
    #[instrument(skip(self), target = "coordinator")]
    pub async fn audit_integrity(&self) -> Vec<Violation> {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "audit skipped");
                return Vec::new();
            }
        };

        let found = audit(&mut state);
        if found.is_empty() {
            debug!("role state consistent");
            return found;
        }

        for violation in &found {
            warn!(
                component = "coordinator",
                error = %RoleError::IntegrityViolation(violation.to_string()),
                "integrity violation corrected"
            );
        }
        self.persist(&state).await;
        found
    }

    /// Drop roles held by tabs the registry no longer lists. A missing
    /// primary is replaced through promotion. Returns the number of tabs
    /// dropped.
    #[instrument(skip(self), target = "coordinator")]
    pub async fn sweep_stale_tabs(&self) -> usize {
        let mut state = match self.enter().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(component = "coordinator", error = %e, "sweep skipped");
                return 0;
            }
        };

        // Query under the lock: no assignment may land between the snapshot
        // and the removals.
        let query = timeout(
            self.cfg.registry_timeout,
            self.registry.query_all(&self.cfg.tab_filter),
        );
        let open: Vec<TabId> = match warn_if_slow("registry.query_all", SLOW_REGISTRY, query).await {
            Ok(Ok(tabs)) => tabs,
            Ok(Err(e)) => {
                warn!(error = %RoleError::Registry(e.to_string()), "sweep skipped");
                return 0;
            }
            Err(_) => {
                warn!("tab query timed out; sweep skipped");
                return 0;
            }
        };

        let stale: Vec<TabId> = state
            .secondary_tab_ids
            .iter()
            .filter(|id| !open.contains(id))
            .cloned()
            .collect();
        for tab_id in &stale {
            state.remove_secondary(tab_id);
        }

        let primary_gone = state
            .primary_tab_id
            .as_ref()
            .is_some_and(|p| !open.contains(p));

        if primary_gone {
            // promote_locked persists.
            self.promote_locked(&mut state).await;
        } else if !stale.is_empty() {
            self.persist(&state).await;
        }

        let dropped = stale.len() + usize::from(primary_gone);
        if dropped > 0 {
            info!(dropped, primary_gone, "stale tabs swept");
        }
        dropped
    }

    /// Periodic health check: audit plus stale-tab sweep every
    /// `audit_interval`. The first pass runs one interval after the call.
    pub fn spawn_audit_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.cfg.audit_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let trace_id = TraceId::new();
                let span = root_span("periodic_audit", &trace_id);
                async {
                    this.audit_integrity().await;
                    this.sweep_stale_tabs().await;
                }
                .instrument(span)
                .await;
            }
        })
    }

    /// Consume tab lifecycle events until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TabEvent>) {
        info!(component = "coordinator", "tab event loop started");

        while let Some(event) = rx.recv().await {
            match event {
                TabEvent::Closed(tab_id) => self.on_tab_closed(&tab_id).await,
                TabEvent::Updated { tab_id, instrument } => {
                    self.set_instrument(&tab_id, instrument).await;
                }
            }
        }

        info!(component = "coordinator", "tab event loop stopped");
    }

    /// Snapshot of the current role state.
    pub async fn status(&self) -> RoleState {
        self.state.lock().await.clone()
    }

    pub async fn role_of(&self, tab_id: &TabId) -> Option<Role> {
        self.state.lock().await.role_of(tab_id)
    }

    /// Current secondaries with the instrument each one displays.
    pub async fn secondaries(&self) -> Vec<(TabId, Option<InstrumentRef>)> {
        let state = self.state.lock().await;
        state
            .secondary_tab_ids
            .iter()
            .map(|id| (id.clone(), state.instrument_of(id).cloned()))
            .collect()
    }

    /// Liveness as the coordinator sees it: registry errors and timeouts
    /// count as dead.
    pub async fn is_tab_alive(&self, tab_id: &TabId) -> bool {
        self.is_alive(tab_id).await
    }

    /// Send `message` to a tab, bounded by `registry_timeout`.
    pub async fn notify_tab(&self, tab_id: &TabId, message: &TabMessage) -> NotifyOutcome {
        let send = timeout(self.cfg.registry_timeout, self.registry.notify(tab_id, message));
        match warn_if_slow("registry.notify", SLOW_REGISTRY, send).await {
            Ok(outcome) => outcome,
            Err(_) => NotifyOutcome::Failed("notify timed out".to_string()),
        }
    }

    fn schedule_audit(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.cfg.audit_delay).await;
            this.audit_integrity().await;
        });
    }

    /// Wait for `Ready`, then take the state lock. Both waits are bounded;
    /// only the lock wait fails.
    async fn enter(&self) -> Result<MutexGuard<'_, RoleState>, RoleError> {
        self.wait_ready().await;

        timeout(self.cfg.lock_timeout, self.state.lock())
            .await
            .map_err(|_| RoleError::LockTimeout)
    }

    async fn wait_ready(&self) {
        let mut rx = self.phase.subscribe();

        let ready = async {
            loop {
                if *rx.borrow_and_update() == CoordinatorPhase::Ready {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };

        if timeout(self.cfg.ready_timeout, ready).await.is_err() {
            warn!(
                component = "coordinator",
                phase = ?self.phase(),
                "coordinator not ready; proceeding anyway"
            );
        }
    }

    async fn is_alive(&self, tab_id: &TabId) -> bool {
        let check = timeout(self.cfg.registry_timeout, self.registry.is_alive(tab_id));

        match warn_if_slow("registry.is_alive", SLOW_REGISTRY, check).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                warn!(tab_id = %tab_id, error = %RoleError::Registry(e.to_string()), "liveness check failed; treating tab as dead");
                false
            }
            Err(_) => {
                warn!(tab_id = %tab_id, "liveness check timed out; treating tab as dead");
                false
            }
        }
    }

    /// Returns whether the write landed.
    async fn persist(&self, state: &RoleState) -> bool {
        match warn_if_slow("store.save", SLOW_STORE, self.store.save(state)).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    component = "coordinator",
                    error = %RoleError::Persistence(e.to_string()),
                    "persist failed; in-memory state stays authoritative"
                );
                false
            }
        }
    }
}
