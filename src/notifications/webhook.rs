use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::message::WebhookPayload;
use super::{ChannelKind, Delivery, NotificationChannel};
use crate::cards::models::MissedCard;
use crate::error::ChannelError;
use crate::settings::{Settings, WEBHOOK_URL};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(6);

/// Generic JSON webhook channel
pub struct WebhookChannel {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: WEBHOOK_TIMEOUT,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(
        &self,
        settings: &Settings,
        missed: &[MissedCard],
    ) -> Result<Delivery, ChannelError> {
        let Some(url) = settings.get(WEBHOOK_URL) else {
            return Ok(Delivery::Skipped("WEBHOOK_URL not set"));
        };

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&WebhookPayload::missed_payments(missed))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                service: "webhook",
                status: status.as_u16(),
                body,
            });
        }

        info!("🔗 Missed-payment webhook delivered ({})", status);
        Ok(Delivery::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{missed_card, spawn_mock_server};
    use axum::{http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_posts_missed_payments_payload() {
        let received = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
        let sink = received.clone();
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(body);
                    StatusCode::NO_CONTENT
                }
            }),
        );
        let base = spawn_mock_server(app).await;

        let settings = Settings::from_pairs([(WEBHOOK_URL, format!("{}/hook", base))]);
        let missed = vec![
            missed_card(1, "Visa", "4242", 15),
            missed_card(2, "Amex", "0005", 31),
        ];

        let result = WebhookChannel::new().deliver(&settings, &missed).await;
        assert!(matches!(result, Ok(Delivery::Sent)));

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "missed_payments");
        assert_eq!(received[0]["cards"][1]["name"], "Amex");
        assert_eq!(received[0]["cards"][1]["last4"], "0005");
        assert_eq!(received[0]["cards"][1]["due_day"], 31);
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn_mock_server(app).await;

        let settings = Settings::from_pairs([(WEBHOOK_URL, format!("{}/hook", base))]);
        let result = WebhookChannel::new()
            .deliver(&settings, &[missed_card(1, "Visa", "4242", 15)])
            .await;

        match result {
            Err(ChannelError::Rejected { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_receiver_times_out() {
        let app = Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        );
        let base = spawn_mock_server(app).await;

        let channel = WebhookChannel {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(100),
        };
        let settings = Settings::from_pairs([(WEBHOOK_URL, format!("{}/hook", base))]);
        let result = channel
            .deliver(&settings, &[missed_card(1, "Visa", "4242", 15)])
            .await;

        assert!(matches!(result, Err(ChannelError::Http(e)) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_skipped_without_url() {
        let result = WebhookChannel::new()
            .deliver(&Settings::default(), &[missed_card(1, "Visa", "4242", 15)])
            .await;
        assert_eq!(result.unwrap(), Delivery::Skipped("WEBHOOK_URL not set"));
    }
}
