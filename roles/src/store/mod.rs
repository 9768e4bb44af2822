pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryRoleStore;
pub use sqlite_store::SqliteRoleStore;

use crate::model::RoleState;

/// Durable home of the role state. Must survive process restarts.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync + 'static {
    /// `None` when nothing was ever saved.
    async fn load(&self) -> anyhow::Result<Option<RoleState>>;
    async fn save(&self, state: &RoleState) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}
