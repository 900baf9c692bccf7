use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    cards::CardRepository,
    config::Config,
    error::{AppError, AppResult},
    notifications::NotificationDispatcher,
    reconciliation::{ReconciliationScheduler, Reconciler, RunLedger},
    settings::{Settings, SettingsRepository},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let state = build_state(pool, config);

    // Environment values only seed a fresh database; afterwards the API owns them
    if state.settings.seed_if_empty(&Settings::from_env()).await? {
        info!("✅ Notification settings seeded from environment");
    }

    info!(
        "📋 {} card(s) tracked, timezone {}",
        state.cards.list_cards().await?.len(),
        state.timezone
    );

    Ok(state)
}

/// Wire repositories, dispatcher and scheduler over an open pool
pub fn build_state(pool: SqlitePool, config: &Config) -> AppState {
    let cards = Arc::new(CardRepository::new(pool.clone()));
    let settings = Arc::new(SettingsRepository::new(pool.clone()));
    let ledger = Arc::new(RunLedger::new(pool));

    let dispatcher = Arc::new(NotificationDispatcher::new(settings.clone()));
    info!("✅ Notification dispatcher initialized (email, webhook, sms)");

    let reconciler = Arc::new(Reconciler::new(cards.clone(), ledger.clone(), dispatcher));
    let scheduler = Arc::new(ReconciliationScheduler::new(
        reconciler,
        config.trigger,
        config.timezone,
    ));

    AppState {
        cards,
        settings,
        ledger,
        scheduler,
        timezone: config.timezone,
    }
}

async fn initialize_database(database_url: &str) -> AppResult<SqlitePool> {
    info!("📊 Connecting to database...");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    // get_filename consumes the options
    let path = options.clone().get_filename();
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Config(format!("cannot create database directory {:?}: {}", dir, e))
            })?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    info!("✓ Database pool configured: 5 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::MonthlyTrigger;

    #[tokio::test]
    async fn test_file_database_is_created_with_schema() {
        let dir = std::env::temp_dir().join(format!("cc-tracker-{}", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}/nested/cards.db", dir.display());

        let pool = initialize_database(&url).await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for table in ["cards", "payments", "reconciliation_runs", "settings"] {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode, "wal");

        pool.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_build_state_shares_timezone() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            timezone: chrono_tz::Asia::Tokyo,
            cors_origins: Vec::new(),
            trigger: MonthlyTrigger::default(),
            rate_limit_per_minute: 10,
        };
        let state = build_state(crate::test_support::memory_pool().await, &config);
        assert_eq!(state.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(state.scheduler.timezone(), chrono_tz::Asia::Tokyo);
    }
}
