use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use super::message::sms_body;
use super::{ChannelKind, Delivery, NotificationChannel};
use crate::cards::models::MissedCard;
use crate::error::ChannelError;
use crate::settings::{Settings, SMS_FROM, SMS_SID, SMS_TO, SMS_TOKEN};

const TWILIO_API_BASE: &str = "https://api.twilio.com";
const SMS_TIMEOUT: Duration = Duration::from_secs(15);

/// Twilio SMS channel
pub struct TwilioSmsChannel {
    api_base: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TwilioSmsResponse {
    sid: String,
    status: String,
}

impl TwilioSmsChannel {
    pub fn new() -> Self {
        Self::with_api_base(TWILIO_API_BASE)
    }

    /// Point the channel at another Twilio-compatible endpoint
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            client: reqwest::Client::new(),
            timeout: SMS_TIMEOUT,
        }
    }
}

#[async_trait]
impl NotificationChannel for TwilioSmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn deliver(
        &self,
        settings: &Settings,
        missed: &[MissedCard],
    ) -> Result<Delivery, ChannelError> {
        let (Some(account_sid), Some(auth_token), Some(from), Some(to)) = (
            settings.get(SMS_SID),
            settings.get(SMS_TOKEN),
            settings.get(SMS_FROM),
            settings.get(SMS_TO),
        ) else {
            return Ok(Delivery::Skipped("SMS_SID, SMS_TOKEN, SMS_FROM or SMS_TO not set"));
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            account_sid
        );
        let body = sms_body(missed.len());

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .basic_auth(account_sid, Some(auth_token))
            .form(&[("From", from), ("To", to), ("Body", body.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                service: "twilio",
                status,
                body: error_text,
            });
        }

        // a 2xx means Twilio accepted the message; the body only feeds the log
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TwilioSmsResponse>(&text) {
            Ok(result) => info!("📱 SMS sent via Twilio: {} ({})", result.sid, result.status),
            Err(_) => info!("📱 SMS accepted by Twilio ({})", status),
        }
        Ok(Delivery::Sent)
    }
}
