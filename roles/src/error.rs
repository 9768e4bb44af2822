use thiserror::Error;

use crate::model::TabId;

/// Conditions the coordinator and router recover from locally.
///
/// None of these cross the coordinator boundary as an `Err`; at most a
/// fallback [`crate::RoleDecision`] carries one in its `error` field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("lock timeout")]
    LockTimeout,

    #[error("stale tab reference: {0}")]
    StaleReference(TabId),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("channel closed: {0}")]
    ChannelClosed(TabId),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("tab registry failure: {0}")]
    Registry(String),
}
