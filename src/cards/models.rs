use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::status::{classify, derive_due_date, DueStatus};

///Card entity - one recurring monthly obligation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub last4: String,
    /// Day of month the payment is due (1-31)
    pub due_day: u32,
    pub notes: String,
    pub paid: bool,
    /// Set iff `paid`
    pub payment_date: Option<NaiveDate>,
}

impl Card {
    /// Due date and display status of this card relative to `today`
    pub fn status_on(&self, today: NaiveDate) -> (NaiveDate, DueStatus) {
        let due_date = derive_due_date(self.due_day, today);
        (due_date, classify(self.paid, due_date, today))
    }
}

/// Row shape of the `cards` table
#[derive(Debug, FromRow)]
pub(crate) struct CardRow {
    pub id: i64,
    pub name: String,
    pub last4: String,
    pub due_day: i64,
    pub notes: String,
    pub paid: bool,
    pub payment_date: Option<NaiveDate>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            last4: row.last4,
            // the schema CHECK keeps due_day within 1..=31
            due_day: u32::try_from(row.due_day).unwrap_or(1),
            notes: row.notes,
            paid: row.paid,
            payment_date: row.payment_date,
        }
    }
}

/// Append-only payment log entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub card_id: i64,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payment joined with its card, as exported in the monthly report
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentReportRow {
    pub name: String,
    pub last4: String,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub note: Option<String>,
}

/// Fields of a card that can be created or edited by hand
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub name: String,
    pub last4: String,
    pub due_day: u32,
    pub notes: String,
}

/// Card left unpaid at reconciliation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedCard {
    pub id: i64,
    pub name: String,
    pub last4: String,
    pub due_day: u32,
}

impl From<&Card> for MissedCard {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            name: card.name.clone(),
            last4: card.last4.clone(),
            due_day: card.due_day,
        }
    }
}
