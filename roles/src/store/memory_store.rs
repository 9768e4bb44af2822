use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RoleStore;
use crate::model::RoleState;

/// Process-local store. Durable only for the lifetime of the process.
///
/// `set_failing(true)` makes every write fail, which is how hosts and tests
/// exercise the persistence-failure path.
#[derive(Default)]
pub struct MemoryRoleStore {
    state: Mutex<Option<RoleState>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryRoleStore {
    pub fn with_state(state: RoleState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Option<RoleState> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn load(&self) -> anyhow::Result<Option<RoleState>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &RoleState) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("memory store is in failing mode");
        }
        *self.state.lock().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.state.lock().await = None;
        Ok(())
    }
}
