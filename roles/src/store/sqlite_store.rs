//! SqliteRoleStore
//! ----------------
//! SQLite-backed implementation of [`RoleStore`]. The role state lives as a
//! single JSON document in a key-value table, mirroring the browser storage
//! contract (`get(keys)` / `set(map)`) the coordinator was designed against:
//!
//!  - the document survives restarts
//!  - every save is a full upsert of the document
//!  - `clear` removes the key entirely
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, instrument};

use super::RoleStore;
use crate::model::RoleState;

/// Key under which the role state document is stored.
pub const ROLE_STATE_KEY: &str = "roleState";

pub struct SqliteRoleStore {
    pool: SqlitePool,
}

impl SqliteRoleStore {
    /// Wrap an existing pool. The schema must already exist; see [`Self::migrate`].
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// A single connection serialises writes of the one document and keeps
    /// `sqlite::memory:` URLs pointing at one database.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS role_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RoleStore for SqliteRoleStore {
    #[instrument(skip(self), target = "store")]
    async fn load(&self) -> anyhow::Result<Option<RoleState>> {
        let row = sqlx::query("SELECT value FROM role_store WHERE key = ?")
            .bind(ROLE_STATE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            debug!("no persisted role state");
            return Ok(None);
        };

        let json: String = row.get("value");
        let state: RoleState = serde_json::from_str(&json)
            .map_err(|e| anyhow::anyhow!("Invalid role state JSON '{}': {}", json, e))?;

        Ok(Some(state))
    }

    /// Upsert the whole document.
    #[instrument(skip(self, state), target = "store", fields(primary = ?state.primary_tab_id))]
    async fn save(&self, state: &RoleState) -> anyhow::Result<()> {
        let json = serde_json::to_string(state)?;

        sqlx::query(
            r#"
            INSERT INTO role_store (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value;
        "#,
        )
        .bind(ROLE_STATE_KEY)
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM role_store WHERE key = ?")
            .bind(ROLE_STATE_KEY)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
