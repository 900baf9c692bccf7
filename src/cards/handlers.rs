use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use super::models::{Card, CardDetails};
use super::report::{write_csv, ReportMonth};
use crate::api::handler::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::ValidatedJson;
use crate::status::{today_in, DueStatus};

const DEFAULT_PAYMENT_METHOD: &str = "manual";

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardRequest {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(custom = "not_blank", length(max = 4))]
    pub last4: String,
    #[validate(range(min = 1, max = 31))]
    pub due_day: u32,
    #[serde(default)]
    pub notes: String,
}

/// Either a payment toggle (`paid` present) or an edit of the card fields
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCardRequest {
    pub paid: Option<bool>,
    pub method: Option<String>,
    pub note: Option<String>,

    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    #[validate(custom = "not_blank", length(max = 4))]
    pub last4: Option<String>,
    #[validate(range(min = 1, max = 31))]
    pub due_day: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteCardResponse {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct CardStatusResponse {
    #[serde(flatten)]
    pub card: Card,
    pub due_date: NaiveDate,
    #[serde(rename = "color")]
    pub status: DueStatus,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub month: Option<String>,
}

/// GET /api/cards
pub async fn list_cards(State(state): State<AppState>) -> AppResult<Json<Vec<Card>>> {
    Ok(Json(state.cards.list_cards().await?))
}

/// POST /api/cards
pub async fn create_card(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateCardRequest>,
) -> AppResult<(StatusCode, Json<Card>)> {
    let details = CardDetails {
        name: req.name.trim().to_string(),
        last4: req.last4.trim().to_string(),
        due_day: req.due_day,
        notes: req.notes,
    };

    let card = state.cards.create_card(&details).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

/// PUT /api/cards/:id
pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateCardRequest>,
) -> AppResult<Json<Card>> {
    if let Some(paid) = req.paid {
        let today = today_in(state.timezone, Utc::now());
        let method = req.method.as_deref().unwrap_or(DEFAULT_PAYMENT_METHOD);
        let (card, payment) = state
            .cards
            .set_paid(card_id, paid, today, Some(method), req.note.as_deref())
            .await?;

        if payment.is_none() && paid {
            info!("Card {} already paid, no new payment recorded", card_id);
        }
        return Ok(Json(card));
    }

    let current = state
        .cards
        .get_card(card_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("card {}", card_id)))?;

    let details = CardDetails {
        name: req.name.map(|n| n.trim().to_string()).unwrap_or(current.name),
        last4: req.last4.map(|l| l.trim().to_string()).unwrap_or(current.last4),
        due_day: req.due_day.unwrap_or(current.due_day),
        notes: req.notes.unwrap_or(current.notes),
    };

    Ok(Json(state.cards.update_card(card_id, &details).await?))
}

/// DELETE /api/cards/:id
pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<i64>,
) -> AppResult<Json<DeleteCardResponse>> {
    state.cards.delete_card(card_id).await?;
    Ok(Json(DeleteCardResponse { ok: true }))
}

/// GET /api/statuses - every card with its due date and color for today
pub async fn list_statuses(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CardStatusResponse>>> {
    let today = today_in(state.timezone, Utc::now());
    let statuses = state
        .cards
        .list_cards()
        .await?
        .into_iter()
        .map(|card| {
            let (due_date, status) = card.status_on(today);
            CardStatusResponse {
                card,
                due_date,
                status,
            }
        })
        .collect();

    Ok(Json(statuses))
}

/// GET /api/report?month=YYYY-MM - payments of one month as a CSV attachment
pub async fn payment_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let month = query
        .month
        .ok_or_else(|| AppError::InvalidInput("month YYYY-MM required".to_string()))?;
    let month = ReportMonth::parse(&month)?;

    let rows = state.cards.payments_between(month.start, month.end).await?;
    let body = write_csv(&rows)?;

    info!("📄 Payment report {}: {} row(s)", month.label(), rows.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", month.file_name()),
            ),
        ],
        body,
    )
        .into_response())
}
