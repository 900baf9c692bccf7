use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{info, warn};

use super::message::{email_body, EMAIL_SUBJECT};
use super::{ChannelKind, Delivery, NotificationChannel};
use crate::cards::models::MissedCard;
use crate::error::ChannelError;
use crate::settings::{
    Settings, ALERT_EMAIL, DEFAULT_SMTP_PORT, SMTP_HOST, SMTP_PASS, SMTP_PORT, SMTP_USER,
};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP email channel (STARTTLS, optional login)
pub struct SmtpEmailChannel {
    timeout: Duration,
}

impl SmtpEmailChannel {
    pub fn new() -> Self {
        Self {
            timeout: SMTP_TIMEOUT,
        }
    }
}

/// `SMTP_PORT`, falling back to 587 when unset or unparsable
fn smtp_port(settings: &Settings) -> u16 {
    match settings.get(SMTP_PORT) {
        None => DEFAULT_SMTP_PORT,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("⚠️  Invalid SMTP_PORT {:?}, using {}", raw, DEFAULT_SMTP_PORT);
            DEFAULT_SMTP_PORT
        }),
    }
}

#[async_trait]
impl NotificationChannel for SmtpEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(
        &self,
        settings: &Settings,
        missed: &[MissedCard],
    ) -> Result<Delivery, ChannelError> {
        let (Some(host), Some(to)) = (settings.get(SMTP_HOST), settings.get(ALERT_EMAIL)) else {
            return Ok(Delivery::Skipped("SMTP_HOST or ALERT_EMAIL not set"));
        };

        let port = smtp_port(settings);
        let user = settings.get(SMTP_USER);
        let password = settings.get(SMTP_PASS);

        // SMTP users are often API key names rather than addresses
        let from = user.filter(|u| u.contains('@')).unwrap_or(to);

        let message = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .to(to.parse::<Mailbox>()?)
            .subject(EMAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(email_body(missed))?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .timeout(Some(self.timeout));

        if let (Some(user), Some(password)) = (user, password) {
            transport = transport.credentials(Credentials::new(user.to_string(), password.to_string()));
        }

        transport.build().send(message).await?;

        info!("📧 Missed-payment email sent to {} via {}:{}", to, host, port);
        Ok(Delivery::Sent)
    }
}
