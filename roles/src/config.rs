use std::time::Duration;

use crate::registry::TabFilter;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Upper bound on waiting for the role-state lock in `assign_role`.
    ///
    /// On expiry the caller gets the availability fallback (primary,
    /// connect) instead of waiting further.
    pub lock_timeout: Duration,

    /// Upper bound on waiting for restoration to finish. Callers proceed
    /// with a warning once it is exceeded.
    pub ready_timeout: Duration,

    /// Delay between releasing the lock after a role assignment and the
    /// follow-up integrity audit.
    pub audit_delay: Duration,

    /// Cadence of the periodic audit + stale-tab sweep.
    pub audit_interval: Duration,

    /// Upper bound on each liveness check or notification sent to the tab
    /// registry. A timeout counts as "dead" / "failed".
    pub registry_timeout: Duration,

    /// Which tabs the periodic sweep considers to be ours.
    pub tab_filter: TabFilter,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(5),
            audit_delay: Duration::from_millis(100),
            audit_interval: Duration::from_secs(15 * 60),
            registry_timeout: Duration::from_secs(2),
            tab_filter: TabFilter::default(),
        }
    }
}
