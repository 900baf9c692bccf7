use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{error, info};

use super::models::*;
use crate::{
    cards::CardRepository,
    error::{AppError, AppResult},
    reconciliation::{FireOutcome, ReconciliationReport, ReconciliationScheduler, RunLedger},
    settings::SettingsRepository,
};

const DEFAULT_RUNS_LIMIT: i64 = 12;
const MAX_RUNS_LIMIT: i64 = 120;

#[derive(Clone)]
pub struct AppState {
    pub cards: Arc<CardRepository>,
    pub settings: Arc<SettingsRepository>,
    pub ledger: Arc<RunLedger>,
    pub scheduler: Arc<ReconciliationScheduler>,
    /// Timezone that decides what "today" is
    pub timezone: Tz,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.cards.pool).await {
        Ok(_) => true,
        Err(e) => {
            error!("❌ Health check database query failed: {}", e);
            false
        }
    };

    let (code, status) = if database {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now(),
            database,
        }),
    )
}

/// POST /api/reconciliation/run - reconcile the current cycle now
///
/// The current cycle is the one whose scheduled fire passed most recently.
/// Paid cards of that cycle are reset and unpaid ones reported, exactly as
/// the scheduled run would.
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> AppResult<Json<ReconciliationReport>> {
    info!("🔄 Manual reconciliation requested");

    // detached so a dropped request cannot cancel a run halfway through dispatch
    let scheduler = state.scheduler.clone();
    let outcome = tokio::spawn(async move { scheduler.run_now().await })
        .await
        .map_err(|e| AppError::Internal(format!("reconciliation task failed: {}", e)))?;

    match outcome {
        FireOutcome::Completed(report) => Ok(Json(report)),
        FireOutcome::Dropped => Err(AppError::ReconciliationInProgress),
        FireOutcome::Failed(cause) => Err(AppError::Internal(cause)),
    }
}

/// GET /api/reconciliation/status
pub async fn reconciliation_status(
    State(state): State<AppState>,
) -> AppResult<Json<SchedulerStatusResponse>> {
    let last_run = state.ledger.recent(1).await?.into_iter().next();

    Ok(Json(SchedulerStatusResponse {
        state: state.scheduler.state(),
        timezone: state.scheduler.timezone().to_string(),
        trigger: state.scheduler.trigger(),
        next_fire: state.scheduler.next_fire(),
        last_run,
    }))
}

/// GET /api/reconciliation/runs?limit=N
pub async fn list_reconciliation_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> AppResult<Json<RunsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNS_LIMIT)
        .clamp(1, MAX_RUNS_LIMIT);

    Ok(Json(RunsResponse {
        runs: state.ledger.recent(limit).await?,
    }))
}
