use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::notifications::DispatchResult;

/// Persisted record of one reconciled cycle
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRun {
    pub cycle: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reset_count: i64,
    pub missed_count: i64,
    pub dispatch: Option<DispatchResult>,
}

#[derive(Debug, FromRow)]
struct RunRow {
    cycle: String,
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    reset_count: i64,
    missed_count: i64,
    dispatch: Option<String>,
}

impl From<RunRow> for ReconciliationRun {
    fn from(row: RunRow) -> Self {
        Self {
            cycle: row.cycle,
            run_id: row.run_id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            reset_count: row.reset_count,
            missed_count: row.missed_count,
            dispatch: row
                .dispatch
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok()),
        }
    }
}

/// Run ledger - at most one claimed run per cycle key
pub struct RunLedger {
    pool: SqlitePool,
}

impl RunLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Claim `cycle` inside the caller's transaction
    ///
    /// Returns `false` when another run already holds the cycle. The claim only
    /// becomes visible when the caller commits.
    pub async fn claim(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        cycle: &str,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO reconciliation_runs (cycle, run_id, started_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(cycle)
        .bind(run_id.to_string())
        .bind(started_at)
        .execute(&mut **tx)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!("Cycle {} claim by run {}: {}", cycle, run_id, claimed);
        Ok(claimed)
    }

    /// Store the outcome of a finished run
    pub async fn record_finish(
        &self,
        cycle: &str,
        reset_count: usize,
        missed_count: usize,
        dispatch: Option<&DispatchResult>,
    ) -> AppResult<()> {
        let dispatch = dispatch.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            UPDATE reconciliation_runs
            SET finished_at = ?, reset_count = ?, missed_count = ?, dispatch = ?
            WHERE cycle = ?
            "#,
        )
        .bind(Utc::now())
        .bind(reset_count as i64)
        .bind(missed_count as i64)
        .bind(dispatch)
        .bind(cycle)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, cycle: &str) -> AppResult<Option<ReconciliationRun>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT cycle, run_id, started_at, finished_at, reset_count, missed_count, dispatch
            FROM reconciliation_runs
            WHERE cycle = ?
            "#,
        )
        .bind(cycle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ReconciliationRun::from))
    }

    /// Most recent runs first
    pub async fn recent(&self, limit: i64) -> AppResult<Vec<ReconciliationRun>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT cycle, run_id, started_at, finished_at, reset_count, missed_count, dispatch
            FROM reconciliation_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReconciliationRun::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_cycle_can_be_claimed_once() {
        let pool = memory_pool().await;
        let ledger = RunLedger::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        assert!(ledger.claim(&mut tx, "2025-06", Uuid::new_v4(), Utc::now()).await.unwrap());
        assert!(!ledger.claim(&mut tx, "2025-06", Uuid::new_v4(), Utc::now()).await.unwrap());
        assert!(ledger.claim(&mut tx, "2025-07", Uuid::new_v4(), Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let runs = ledger.recent(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.finished_at.is_none()));
    }

    #[tokio::test]
    async fn test_rolled_back_claim_is_released() {
        let pool = memory_pool().await;
        let ledger = RunLedger::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        ledger.claim(&mut tx, "2025-06", Uuid::new_v4(), Utc::now()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(ledger.get("2025-06").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_finish_stores_counts_and_dispatch() {
        let pool = memory_pool().await;
        let ledger = RunLedger::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        ledger.claim(&mut tx, "2025-06", Uuid::new_v4(), Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        ledger
            .record_finish("2025-06", 3, 2, Some(&DispatchResult::default()))
            .await
            .unwrap();

        let run = ledger.get("2025-06").await.unwrap().unwrap();
        assert_eq!(run.reset_count, 3);
        assert_eq!(run.missed_count, 2);
        assert!(run.finished_at.is_some());
        assert_eq!(run.dispatch, Some(DispatchResult::default()));
    }
}
