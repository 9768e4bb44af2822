use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use market::types::InstrumentRef;
use serde::{Deserialize, Serialize};

use crate::error::RoleError;

/// Opaque tab identifier handed out by the tab registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for TabId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        };
        f.write_str(s)
    }
}

/// Per-tab metadata. The owning id is the key in [`RoleState::tab_records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    pub role: Role,

    #[serde(rename = "timestamp")]
    pub registered_at_ms: u64,

    /// Instrument the tab displays; drives event routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentRef>,
}

impl TabRecord {
    pub fn new(role: Role, registered_at_ms: u64) -> Self {
        Self {
            role,
            registered_at_ms,
            instrument: None,
        }
    }
}

/// Who holds the feed connection and who listens.
///
/// Serialises to the persisted schema
/// `{ primaryTabId, secondaryTabIds: [], tabRecords: { id: {role, timestamp, instrument?} } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleState {
    #[serde(default)]
    pub primary_tab_id: Option<TabId>,

    #[serde(default)]
    pub secondary_tab_ids: BTreeSet<TabId>,

    #[serde(default)]
    pub tab_records: BTreeMap<TabId, TabRecord>,
}

impl RoleState {
    pub fn is_primary(&self, tab_id: &TabId) -> bool {
        self.primary_tab_id.as_ref() == Some(tab_id)
    }

    pub fn is_secondary(&self, tab_id: &TabId) -> bool {
        self.secondary_tab_ids.contains(tab_id)
    }

    pub fn role_of(&self, tab_id: &TabId) -> Option<Role> {
        if self.is_primary(tab_id) {
            Some(Role::Primary)
        } else if self.is_secondary(tab_id) {
            Some(Role::Secondary)
        } else {
            None
        }
    }

    pub fn instrument_of(&self, tab_id: &TabId) -> Option<&InstrumentRef> {
        self.tab_records
            .get(tab_id)
            .and_then(|r| r.instrument.as_ref())
    }

    /// Make `tab_id` the primary, keeping its routing metadata if it had any.
    pub(crate) fn set_primary(&mut self, tab_id: &TabId, now_ms: u64) {
        self.secondary_tab_ids.remove(tab_id);
        self.primary_tab_id = Some(tab_id.clone());

        let record = self
            .tab_records
            .entry(tab_id.clone())
            .or_insert_with(|| TabRecord::new(Role::Primary, now_ms));
        record.role = Role::Primary;
    }

    /// Register `tab_id` as a secondary. Re-registration keeps the original
    /// `registered_at_ms` so seniority survives page reloads.
    pub(crate) fn add_secondary(&mut self, tab_id: &TabId, now_ms: u64) {
        self.secondary_tab_ids.insert(tab_id.clone());

        let record = self
            .tab_records
            .entry(tab_id.clone())
            .or_insert_with(|| TabRecord::new(Role::Secondary, now_ms));
        if record.role != Role::Secondary {
            record.role = Role::Secondary;
            record.registered_at_ms = now_ms;
        }
    }

    /// Drop every secondary together with its record.
    pub(crate) fn clear_secondaries(&mut self) -> usize {
        let ids = std::mem::take(&mut self.secondary_tab_ids);
        for id in &ids {
            self.tab_records.remove(id);
        }
        ids.len()
    }

    /// Forget a secondary. Returns whether anything changed.
    pub(crate) fn remove_secondary(&mut self, tab_id: &TabId) -> bool {
        let in_set = self.secondary_tab_ids.remove(tab_id);
        let had_record = if self.is_primary(tab_id) {
            false
        } else {
            self.tab_records.remove(tab_id).is_some()
        };
        in_set || had_record
    }

    /// Clear the primary slot and its record. Returns the old primary.
    pub(crate) fn clear_primary(&mut self) -> Option<TabId> {
        let old = self.primary_tab_id.take()?;
        self.tab_records.remove(&old);
        Some(old)
    }
}

/// Lifecycle of a coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Uninitialized,
    Restoring,
    Ready,
}

/// Answer to a tab asking for its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDecision {
    pub role: Role,
    pub should_connect: bool,
    pub error: Option<RoleError>,
}

impl RoleDecision {
    pub fn primary() -> Self {
        Self {
            role: Role::Primary,
            should_connect: true,
            error: None,
        }
    }

    pub fn secondary() -> Self {
        Self {
            role: Role::Secondary,
            should_connect: false,
            error: None,
        }
    }

    /// Availability fallback: connect anyway and report why.
    pub fn fallback(error: RoleError) -> Self {
        Self {
            role: Role::Primary,
            should_connect: true,
            error: Some(error),
        }
    }
}
