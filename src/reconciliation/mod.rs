// Monthly reconciliation
//
// Once per cycle: paid cards start the new month unpaid, unpaid cards are
// reported as missed. The claim on the cycle and the resets commit together,
// and notification happens only after that commit.

pub mod ledger;
pub mod scheduler;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::cards::models::{Card, MissedCard};
use crate::cards::CardRepository;
use crate::error::AppResult;
use crate::notifications::{DispatchResult, NotificationDispatcher};

pub use ledger::{ReconciliationRun, RunLedger};
pub use scheduler::{FireOutcome, MonthlyTrigger, ReconciliationScheduler, SchedulerState};

/// Ledger key of the cycle containing `date`, e.g. `2025-06`
pub fn cycle_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Reconciled,
    AlreadyReconciled,
}

/// What one reconciliation run did
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub cycle: String,
    pub outcome: RunOutcome,
    pub reset_count: usize,
    pub missed: Vec<MissedCard>,
    /// `None` when there was nothing to notify about
    pub dispatch: Option<DispatchResult>,
}

impl ReconciliationReport {
    fn already_reconciled(run_id: Uuid, cycle: &str) -> Self {
        Self {
            run_id,
            cycle: cycle.to_string(),
            outcome: RunOutcome::AlreadyReconciled,
            reset_count: 0,
            missed: Vec::new(),
            dispatch: None,
        }
    }
}

/// Reconciliation routine over the card store, run ledger and dispatcher
pub struct Reconciler {
    cards: Arc<CardRepository>,
    ledger: Arc<RunLedger>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl Reconciler {
    pub fn new(
        cards: Arc<CardRepository>,
        ledger: Arc<RunLedger>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            cards,
            ledger,
            dispatcher,
        }
    }

    /// Reconcile `cycle` once
    ///
    /// A store error aborts the run before anything is committed. Dispatch and
    /// ledger bookkeeping after the commit never fail the run.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, cycle: &str) -> AppResult<ReconciliationReport> {
        let run_id = Uuid::new_v4();
        let mut tx = self.cards.begin_tx().await?;

        if !self.ledger.claim(&mut tx, cycle, run_id, Utc::now()).await? {
            tx.rollback().await?;
            info!("⏭️  Cycle {} already reconciled, nothing to do", cycle);
            return Ok(ReconciliationReport::already_reconciled(run_id, cycle));
        }

        let cards = self.cards.list_cards_tx(&mut tx).await?;
        let (paid, unpaid): (Vec<Card>, Vec<Card>) = cards.into_iter().partition(|c| c.paid);

        for card in &paid {
            self.cards.reset_paid(&mut tx, card.id).await?;
        }

        tx.commit().await?;

        let missed: Vec<MissedCard> = unpaid.iter().map(MissedCard::from).collect();
        info!(
            "🔄 Cycle {} reconciled: {} card(s) reset, {} missed",
            cycle,
            paid.len(),
            missed.len()
        );

        let dispatch = if missed.is_empty() {
            info!("✓ Every card was paid, no notification needed");
            None
        } else {
            Some(self.dispatcher.dispatch(&missed).await)
        };

        if let Err(e) = self
            .ledger
            .record_finish(cycle, paid.len(), missed.len(), dispatch.as_ref())
            .await
        {
            error!("❌ Could not record outcome of cycle {}: {}", cycle, e);
        }

        Ok(ReconciliationReport {
            run_id,
            cycle: cycle.to_string(),
            outcome: RunOutcome::Reconciled,
            reset_count: paid.len(),
            missed,
            dispatch,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notifications::{ChannelKind, Delivery, NotificationChannel};
    use crate::error::{AppError, ChannelError};
    use crate::settings::Settings;
    use crate::test_support::{details, memory_pool, StaticSettings};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sqlx::SqlitePool;
    use std::time::Duration;

    /// Webhook stand-in that records every missed list it is given
    pub(crate) struct RecordingChannel {
        pub calls: Mutex<Vec<Vec<MissedCard>>>,
        pub delay: Duration,
    }

    impl RecordingChannel {
        pub fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn deliver(
            &self,
            _settings: &Settings,
            missed: &[MissedCard],
        ) -> Result<Delivery, ChannelError> {
            tokio::time::sleep(self.delay).await;
            self.calls.lock().push(missed.to_vec());
            Ok(Delivery::Sent)
        }
    }

    pub(crate) fn reconciler(pool: &SqlitePool, channel: Arc<RecordingChannel>) -> Reconciler {
        let dispatcher = NotificationDispatcher::with_channels(StaticSettings::empty(), vec![channel]);
        Reconciler::new(
            Arc::new(CardRepository::new(pool.clone())),
            Arc::new(RunLedger::new(pool.clone())),
            Arc::new(dispatcher),
        )
    }

    async fn seed(repo: &CardRepository, paid: &[&str], unpaid: &[&str]) {
        let today = NaiveDate::from_ymd_opt(2025, 5, 20).unwrap();
        for (i, name) in paid.iter().enumerate() {
            let card = repo.create_card(&details(name, "1111", 10 + i as u32)).await.unwrap();
            repo.set_paid(card.id, true, today, Some("manual"), None)
                .await
                .unwrap();
        }
        for (i, name) in unpaid.iter().enumerate() {
            repo.create_card(&details(name, "2222", 1 + i as u32)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_paid_cards_reset_and_unpaid_cards_reported() {
        let pool = memory_pool().await;
        let repo = CardRepository::new(pool.clone());
        seed(&repo, &["Visa", "Amex"], &["Discover"]).await;

        let channel = RecordingChannel::new(Duration::ZERO);
        let report = reconciler(&pool, channel.clone())
            .run_cycle("2025-06")
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Reconciled);
        assert_eq!(report.reset_count, 2);
        assert_eq!(report.missed.len(), 1);
        assert_eq!(report.missed[0].name, "Discover");

        let cards = repo.list_cards().await.unwrap();
        assert!(cards.iter().all(|c| !c.paid && c.payment_date.is_none()));

        let calls = channel.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], report.missed);

        // payment history survives the reset
        let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(payments, 2);
    }

    #[tokio::test]
    async fn test_no_dispatch_when_everything_was_paid() {
        let pool = memory_pool().await;
        seed(&CardRepository::new(pool.clone()), &["Visa"], &[]).await;

        let channel = RecordingChannel::new(Duration::ZERO);
        let report = reconciler(&pool, channel.clone())
            .run_cycle("2025-06")
            .await
            .unwrap();

        assert_eq!(report.reset_count, 1);
        assert!(report.missed.is_empty());
        assert!(report.dispatch.is_none());
        assert!(channel.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unpaid_rows_are_left_alone() {
        let pool = memory_pool().await;
        let repo = CardRepository::new(pool.clone());
        seed(&repo, &[], &["Visa", "Amex"]).await;
        let before = repo.list_cards().await.unwrap();

        let report = reconciler(&pool, RecordingChannel::new(Duration::ZERO))
            .run_cycle("2025-06")
            .await
            .unwrap();

        assert_eq!(report.reset_count, 0);
        assert_eq!(report.missed.len(), 2);
        assert_eq!(repo.list_cards().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_second_run_in_same_cycle_is_a_noop() {
        let pool = memory_pool().await;
        let repo = CardRepository::new(pool.clone());
        seed(&repo, &["Visa"], &["Amex"]).await;

        let channel = RecordingChannel::new(Duration::ZERO);
        let reconciler = reconciler(&pool, channel.clone());
        reconciler.run_cycle("2025-06").await.unwrap();

        // paid again after the reset, inside the same cycle
        let visa = repo.list_cards().await.unwrap().into_iter().find(|c| c.name == "Visa").unwrap();
        repo.set_paid(visa.id, true, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(), None, None)
            .await
            .unwrap();

        let second = reconciler.run_cycle("2025-06").await.unwrap();
        assert_eq!(second.outcome, RunOutcome::AlreadyReconciled);
        assert!(repo.get_card(visa.id).await.unwrap().unwrap().paid);
        assert_eq!(channel.calls.lock().len(), 1);

        let run = RunLedger::new(pool.clone()).get("2025-06").await.unwrap().unwrap();
        assert_eq!(run.reset_count, 1);
        assert_eq!(run.missed_count, 1);
        assert!(run.dispatch.unwrap().outcome(ChannelKind::Webhook).unwrap().delivered);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_no_partial_state() {
        let pool = memory_pool().await;
        let repo = CardRepository::new(pool.clone());
        seed(&repo, &["Amex", "Visa"], &["Discover"]).await;

        // the second reset fails after the first one already ran in the transaction
        let visa = repo.list_cards().await.unwrap().into_iter().find(|c| c.name == "Visa").unwrap();
        sqlx::query(&format!(
            "CREATE TRIGGER fail_reset BEFORE UPDATE OF paid ON cards WHEN OLD.id = {} \
             BEGIN SELECT RAISE(ABORT, 'disk on fire'); END",
            visa.id
        ))
        .execute(&pool)
        .await
        .unwrap();

        let channel = RecordingChannel::new(Duration::ZERO);
        let result = reconciler(&pool, channel.clone()).run_cycle("2025-06").await;
        assert!(matches!(result, Err(AppError::Database(_))));

        assert!(repo.list_cards().await.unwrap().iter().filter(|c| c.name != "Discover").all(|c| c.paid));
        assert!(RunLedger::new(pool.clone()).get("2025-06").await.unwrap().is_none());
        assert!(channel.calls.lock().is_empty());
    }

    #[test]
    fn test_cycle_key_format() {
        assert_eq!(cycle_key(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), "2025-01");
        assert_eq!(cycle_key(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()), "2024-12");
    }
}
