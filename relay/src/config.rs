use std::time::Duration;

use market::history::HistoryConfig;
use roles::config::CoordinatorConfig;
use roles::registry::TabFilter;

use crate::error::ConfigError;
use crate::recent::DEFAULT_CAPACITY;

/// Tabs of the trading site the relay manages.
pub const DEFAULT_TAB_URL_PATTERN: &str = "https://www.ls-tc.de/*";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Where the role state is persisted.
    pub database_url: String,

    /// Emit logs as JSON instead of human-readable lines.
    pub log_json: bool,

    // =========================
    // Coordination
    // =========================
    /// Lock/ready/audit timings and the tab filter used by the periodic sweep.
    ///
    /// Only `lock_timeout`, `audit_interval` and the tab filter are read
    /// from the environment; the rest keep their defaults.
    pub coordinator: CoordinatorConfig,

    // =========================
    // Market data
    // =========================
    /// Safety bound on unresolved quote history per instrument.
    ///
    /// Trade-driven compaction normally keeps histories short; this cap only
    /// matters for instruments that stop trading while quotes keep coming.
    pub history: HistoryConfig,

    /// How many classified events the relay keeps for status queries.
    pub recent_events: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tabrelay.db".to_string(),
            log_json: false,
            coordinator: CoordinatorConfig {
                tab_filter: TabFilter {
                    url_pattern: Some(DEFAULT_TAB_URL_PATTERN.to_string()),
                },
                ..Default::default()
            },
            history: HistoryConfig::default(),
            recent_events: DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup("TABRELAY_DATABASE_URL") {
            cfg.database_url = url;
        }
        if let Some(pattern) = lookup("TABRELAY_TAB_URL_PATTERN") {
            cfg.coordinator.tab_filter.url_pattern = Some(pattern);
        }
        if let Some(v) = parse::<u64, _>(&lookup, "TABRELAY_LOCK_TIMEOUT_MS")? {
            cfg.coordinator.lock_timeout = Duration::from_millis(non_zero("TABRELAY_LOCK_TIMEOUT_MS", v)?);
        }
        if let Some(v) = parse::<u64, _>(&lookup, "TABRELAY_AUDIT_INTERVAL_SECS")? {
            cfg.coordinator.audit_interval =
                Duration::from_secs(non_zero("TABRELAY_AUDIT_INTERVAL_SECS", v)?);
        }
        if let Some(v) = parse::<usize, _>(&lookup, "TABRELAY_MAX_HISTORY_POINTS")? {
            cfg.history.max_points = non_zero("TABRELAY_MAX_HISTORY_POINTS", v)?;
        }
        if let Some(v) = parse::<usize, _>(&lookup, "TABRELAY_RECENT_EVENTS")? {
            cfg.recent_events = non_zero("TABRELAY_RECENT_EVENTS", v)?;
        }
        if let Some(v) = parse::<bool, _>(&lookup, "TABRELAY_LOG_JSON")? {
            cfg.log_json = v;
        }

        Ok(cfg)
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn non_zero<T: Default + PartialEq>(var: &'static str, v: T) -> Result<T, ConfigError> {
    if v == T::default() {
        Err(ConfigError::Zero { var })
    } else {
        Ok(v)
    }
}
