// Shared fixtures for unit tests

use async_trait::async_trait;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::cards::models::{CardDetails, MissedCard};
use crate::error::AppResult;
use crate::settings::{Settings, SettingsProvider};

/// Fresh in-memory database with migrations applied
///
/// A single connection that never expires, otherwise each new connection
/// would open its own empty database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn details(name: &str, last4: &str, due_day: u32) -> CardDetails {
    CardDetails {
        name: name.to_string(),
        last4: last4.to_string(),
        due_day,
        notes: String::new(),
    }
}

pub fn missed_card(id: i64, name: &str, last4: &str, due_day: u32) -> MissedCard {
    MissedCard {
        id,
        name: name.to_string(),
        last4: last4.to_string(),
        due_day,
    }
}

/// Settings provider backed by a fixed map
pub struct StaticSettings(Settings);

impl StaticSettings {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self(Settings::default()))
    }

    pub fn with<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Arc<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        Arc::new(Self(Settings::from_pairs(pairs)))
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn snapshot(&self) -> AppResult<Settings> {
        Ok(self.0.clone())
    }
}

/// Serve `app` on an ephemeral local port, returning its base URL
pub async fn spawn_mock_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}
