use super::models::*;
use crate::error::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

const CARD_COLUMNS: &str = "id, name, last4, due_day, notes, paid, payment_date";

/// Card repository - the source of truth for cards and their payments
///
/// Reads and single-statement writes go through the pool. Multi-step writes
/// take an explicit transaction so the caller decides what commits together.
pub struct CardRepository {
    pub pool: SqlitePool,
}

impl CardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ========== CARD OPERATIONS ==========

    pub async fn list_cards(&self) -> AppResult<Vec<Card>> {
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Card::from).collect())
    }

    pub async fn get_card(&self, card_id: i64) -> AppResult<Option<Card>> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE id = ?"
        ))
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Card::from))
    }

    pub async fn create_card(&self, details: &CardDetails) -> AppResult<Card> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            r#"
            INSERT INTO cards (name, last4, due_day, notes)
            VALUES (?, ?, ?, ?)
            RETURNING {CARD_COLUMNS}
            "#
        ))
        .bind(&details.name)
        .bind(&details.last4)
        .bind(i64::from(details.due_day))
        .bind(&details.notes)
        .fetch_one(&self.pool)
        .await?;

        info!("💳 Card created: {} ({})", row.id, row.name);
        Ok(row.into())
    }

    pub async fn update_card(&self, card_id: i64, details: &CardDetails) -> AppResult<Card> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            r#"
            UPDATE cards
            SET name = ?, last4 = ?, due_day = ?, notes = ?
            WHERE id = ?
            RETURNING {CARD_COLUMNS}
            "#
        ))
        .bind(&details.name)
        .bind(&details.last4)
        .bind(i64::from(details.due_day))
        .bind(&details.notes)
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("card {}", card_id)))?;

        Ok(row.into())
    }

    /// Delete a card; its payment records go with it
    pub async fn delete_card(&self, card_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM cards WHERE id = ?")
            .bind(card_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("card {}", card_id)));
        }

        info!("🗑️  Card deleted: {}", card_id);
        Ok(())
    }

    /// Mark a card paid or unpaid
    ///
    /// Paying an unpaid card stamps `payment_date` and appends a payment
    /// record in the same transaction. Paying an already-paid card changes
    /// nothing and records nothing.
    pub async fn set_paid(
        &self,
        card_id: i64,
        paid: bool,
        today: NaiveDate,
        method: Option<&str>,
        note: Option<&str>,
    ) -> AppResult<(Card, Option<PaymentRecord>)> {
        let mut tx = self.begin_tx().await?;

        let current = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE id = ?"
        ))
        .bind(card_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("card {}", card_id)))?;

        if current.paid == paid {
            tx.commit().await?;
            return Ok((current.into(), None));
        }

        let payment_date = paid.then_some(today);
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "UPDATE cards SET paid = ?, payment_date = ? WHERE id = ? RETURNING {CARD_COLUMNS}"
        ))
        .bind(paid)
        .bind(payment_date)
        .bind(card_id)
        .fetch_one(&mut *tx)
        .await?;

        let payment = if paid {
            Some(self.record_payment(&mut tx, card_id, today, method, note).await?)
        } else {
            None
        };

        tx.commit().await?;
        Ok((row.into(), payment))
    }

    // ========== PAYMENT OPERATIONS ==========

    pub async fn record_payment(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        card_id: i64,
        payment_date: NaiveDate,
        method: Option<&str>,
        note: Option<&str>,
    ) -> AppResult<PaymentRecord> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payments (card_id, payment_date, method, note, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, card_id, payment_date, method, note, created_at
            "#,
        )
        .bind(card_id)
        .bind(payment_date)
        .bind(method)
        .bind(note)
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        info!("🧾 Payment recorded: card={} date={}", card_id, payment_date);
        Ok(record)
    }

    /// Payments dated within `[start, end)`, oldest first
    pub async fn payments_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<PaymentReportRow>> {
        let rows = sqlx::query_as::<_, PaymentReportRow>(
            r#"
            SELECT c.name, c.last4, p.payment_date, p.method, p.note
            FROM payments p
            JOIN cards c ON c.id = p.card_id
            WHERE p.payment_date >= ? AND p.payment_date < ?
            ORDER BY p.payment_date, p.id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ========== RECONCILIATION OPERATIONS ==========

    pub async fn list_cards_tx(&self, tx: &mut Transaction<'_, Sqlite>) -> AppResult<Vec<Card>> {
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards ORDER BY id"
        ))
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(Card::from).collect())
    }

    /// Start a fresh cycle for a paid card
    pub async fn reset_paid(&self, tx: &mut Transaction<'_, Sqlite>, card_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE cards SET paid = 0, payment_date = NULL WHERE id = ?")
            .bind(card_id)
            .execute(&mut **tx)
            .await?;

        debug!("Card {} reset to unpaid", card_id);
        Ok(())
    }
}
