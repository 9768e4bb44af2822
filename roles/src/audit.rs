//! Role-state integrity audit.
//!
//! Canonical sources, in order of precedence:
//!   1. `primary_tab_id` decides who is primary.
//!   2. A tab's record decides whether it may sit in the secondary set.
//!
//! Whatever contradicts them is removed or rewritten in place. The audit
//! never consults the tab registry and is idempotent.

use std::fmt;

use crate::model::{Role, RoleState, TabId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The primary also sat in the secondary set.
    PrimaryListedAsSecondary(TabId),
    /// The primary's record claimed the secondary role.
    PrimaryRecordedAsSecondary(TabId),
    /// A secondary had no record.
    SecondaryWithoutRecord(TabId),
    /// A secondary's record claimed the primary role.
    SecondaryRecordedAsPrimary(TabId),
    /// A record for a tab that holds no role.
    OrphanRecord(TabId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PrimaryListedAsSecondary(id) => {
                write!(f, "primary {id} listed as secondary")
            }
            Violation::PrimaryRecordedAsSecondary(id) => {
                write!(f, "primary {id} recorded with secondary role")
            }
            Violation::SecondaryWithoutRecord(id) => write!(f, "secondary {id} has no record"),
            Violation::SecondaryRecordedAsPrimary(id) => {
                write!(f, "secondary {id} recorded with primary role")
            }
            Violation::OrphanRecord(id) => write!(f, "record for {id} holds no role"),
        }
    }
}

/// Repair `state` in place and report what was wrong.
pub fn audit(state: &mut RoleState) -> Vec<Violation> {
    let mut found = Vec::new();

    if let Some(primary) = state.primary_tab_id.clone() {
        if state.secondary_tab_ids.remove(&primary) {
            found.push(Violation::PrimaryListedAsSecondary(primary.clone()));
        }
        if let Some(record) = state.tab_records.get_mut(&primary) {
            if record.role != Role::Primary {
                record.role = Role::Primary;
                found.push(Violation::PrimaryRecordedAsSecondary(primary));
            }
        }
    }

    let secondaries: Vec<TabId> = state.secondary_tab_ids.iter().cloned().collect();
    for id in secondaries {
        match state.tab_records.get(&id).map(|r| r.role) {
            Some(Role::Secondary) => {}
            Some(Role::Primary) => {
                state.secondary_tab_ids.remove(&id);
                state.tab_records.remove(&id);
                found.push(Violation::SecondaryRecordedAsPrimary(id));
            }
            None => {
                state.secondary_tab_ids.remove(&id);
                found.push(Violation::SecondaryWithoutRecord(id));
            }
        }
    }

    let orphans: Vec<TabId> = state
        .tab_records
        .keys()
        .filter(|id| !state.is_primary(id) && !state.is_secondary(id))
        .cloned()
        .collect();
    for id in orphans {
        state.tab_records.remove(&id);
        found.push(Violation::OrphanRecord(id));
    }

    found
}

/// Report violations without touching `state`.
pub fn violations(state: &RoleState) -> Vec<Violation> {
    audit(&mut state.clone())
}
