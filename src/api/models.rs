use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconciliation::{MonthlyTrigger, ReconciliationRun, SchedulerState};

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    /// Defaults to 12, capped at 120
    pub limit: Option<i64>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: bool,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatusResponse {
    pub state: SchedulerState,
    pub timezone: String,
    pub trigger: MonthlyTrigger,
    pub next_fire: Option<DateTime<Utc>>,
    pub last_run: Option<ReconciliationRun>,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<ReconciliationRun>,
}
