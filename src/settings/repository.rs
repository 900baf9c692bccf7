use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use super::{Settings, SettingsProvider};
use crate::error::AppResult;

/// Settings stored as key/value rows
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> AppResult<Settings> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(Settings::from_pairs(rows))
    }

    /// Insert or replace the given keys in one transaction
    pub async fn upsert(&self, values: &[(String, String)]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("⚙️  Settings updated: {} key(s)", values.len());
        Ok(())
    }

    /// Write `seed` only when the table holds no settings yet
    ///
    /// Returns `true` when the seed was applied.
    pub async fn seed_if_empty(&self, seed: &Settings) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&self.pool)
            .await?;

        if count > 0 {
            return Ok(false);
        }

        let mut values: Vec<(String, String)> = seed
            .values()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        values.sort();
        self.upsert(&values).await?;
        Ok(true)
    }
}

#[async_trait]
impl SettingsProvider for SettingsRepository {
    async fn snapshot(&self) -> AppResult<Settings> {
        self.load().await
    }
}
