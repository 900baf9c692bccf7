// Missed-payment notifications
//
// Email: SMTP via lettre (STARTTLS)
// Webhook: JSON POST via reqwest
// SMS: Twilio REST API via reqwest
//
// Channels are independent. Each runs in its own task under a guard timeout,
// so a failure, hang or panic in one never stops the next one from running.

pub mod email;
pub mod message;
pub mod sms;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::cards::models::MissedCard;
use crate::error::ChannelError;
use crate::settings::{Settings, SettingsProvider};

pub use email::SmtpEmailChannel;
pub use sms::TwilioSmsChannel;
pub use webhook::WebhookChannel;

/// Upper bound on a single channel attempt, on top of each transport's own timeout
const CHANNEL_GUARD_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Sms => "sms",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a channel did with a delivery request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Required settings are missing; nothing was attempted
    Skipped(&'static str),
    /// The external service accepted the notification
    Sent,
}

/// Result of one channel for one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub attempted: bool,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ChannelOutcome {
    fn skipped(channel: ChannelKind) -> Self {
        Self {
            channel,
            attempted: false,
            delivered: false,
            cause: None,
        }
    }

    fn delivered(channel: ChannelKind) -> Self {
        Self {
            channel,
            attempted: true,
            delivered: true,
            cause: None,
        }
    }

    fn failed(channel: ChannelKind, cause: String) -> Self {
        Self {
            channel,
            attempted: true,
            delivered: false,
            cause: Some(cause),
        }
    }
}

/// Per-channel outcomes of one dispatch, in attempt order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchResult {
    pub fn outcome(&self, channel: ChannelKind) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }
}

/// Notification channel contract. New channels only need to implement this trait.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver the missed-card notice, or skip when `settings` lack this channel's keys
    async fn deliver(
        &self,
        settings: &Settings,
        missed: &[MissedCard],
    ) -> Result<Delivery, ChannelError>;
}

/// Fans a missed-card list out to every channel, one attempt each
pub struct NotificationDispatcher {
    settings: Arc<dyn SettingsProvider>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    channel_timeout: Duration,
}

impl NotificationDispatcher {
    /// Dispatcher with the standard email → webhook → SMS channel set
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_channels(
            settings,
            vec![
                Arc::new(SmtpEmailChannel::new()),
                Arc::new(WebhookChannel::new()),
                Arc::new(TwilioSmsChannel::new()),
            ],
        )
    }

    pub fn with_channels(
        settings: Arc<dyn SettingsProvider>,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            settings,
            channels,
            channel_timeout: CHANNEL_GUARD_TIMEOUT,
        }
    }

    pub fn with_channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    /// Attempt every channel once, in order. Never fails.
    #[instrument(skip_all, fields(missed = missed.len()))]
    pub async fn dispatch(&self, missed: &[MissedCard]) -> DispatchResult {
        let settings = match self.settings.snapshot().await {
            Ok(settings) => settings,
            Err(e) => {
                error!("❌ Could not load notification settings, all channels inert: {}", e);
                Settings::default()
            }
        };

        let settings = Arc::new(settings);
        let missed: Arc<[MissedCard]> = Arc::from(missed.to_vec());

        let mut result = DispatchResult::default();
        for channel in &self.channels {
            let outcome = self
                .run_channel(channel.clone(), settings.clone(), missed.clone())
                .await;
            result.outcomes.push(outcome);
        }

        info!(
            "📬 Dispatch finished: {}/{} channel(s) delivered",
            result.delivered_count(),
            result.outcomes.len()
        );
        result
    }

    async fn run_channel(
        &self,
        channel: Arc<dyn NotificationChannel>,
        settings: Arc<Settings>,
        missed: Arc<[MissedCard]>,
    ) -> ChannelOutcome {
        let kind = channel.kind();
        let timeout = self.channel_timeout;

        let task = tokio::spawn(async move {
            tokio::time::timeout(timeout, channel.deliver(&settings, &missed)).await
        });

        let result = match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(ChannelError::Timeout(timeout)),
            Err(join_error) => Err(ChannelError::Aborted(join_error.to_string())),
        };

        match result {
            Ok(Delivery::Skipped(reason)) => {
                info!("⏭️  {} channel not configured ({}), skipping", kind, reason);
                ChannelOutcome::skipped(kind)
            }
            Ok(Delivery::Sent) => ChannelOutcome::delivered(kind),
            Err(e) => {
                error!("❌ {} notification failed: {}", kind, e);
                ChannelOutcome::failed(kind, e.to_string())
            }
        }
    }
}
