// Notification settings
//
// A flat string map stored in the `settings` table. Channels read a snapshot
// of it once per dispatch; an empty value means "not configured".

pub mod handlers;
pub mod repository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AppResult;

pub use repository::SettingsRepository;

pub const SMTP_HOST: &str = "SMTP_HOST";
pub const SMTP_PORT: &str = "SMTP_PORT";
pub const SMTP_USER: &str = "SMTP_USER";
pub const SMTP_PASS: &str = "SMTP_PASS";
pub const ALERT_EMAIL: &str = "ALERT_EMAIL";
pub const WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const SMS_SID: &str = "SMS_SID";
pub const SMS_TOKEN: &str = "SMS_TOKEN";
pub const SMS_FROM: &str = "SMS_FROM";
pub const SMS_TO: &str = "SMS_TO";

/// Every key the service understands, in display order
pub const KNOWN_KEYS: [&str; 10] = [
    SMTP_HOST,
    SMTP_PORT,
    SMTP_USER,
    SMTP_PASS,
    ALERT_EMAIL,
    WEBHOOK_URL,
    SMS_SID,
    SMS_TOKEN,
    SMS_FROM,
    SMS_TO,
];

/// Keys whose values are never echoed back over the API
pub const SECRET_KEYS: [&str; 2] = [SMTP_PASS, SMS_TOKEN];

pub const DEFAULT_SMTP_PORT: u16 = 587;

pub fn is_known_key(key: &str) -> bool {
    KNOWN_KEYS.contains(&key)
}

/// Point-in-time copy of the settings map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Build a snapshot from `(key, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Trimmed value for `key`, or `None` when missing or blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    /// Seed values taken from the process environment for every known key
    pub fn from_env() -> Self {
        Self::from_pairs(KNOWN_KEYS.iter().map(|key| {
            let value = std::env::var(key).unwrap_or_default();
            let value = if value.is_empty() && *key == SMTP_PORT {
                DEFAULT_SMTP_PORT.to_string()
            } else {
                value
            };
            (key.to_string(), value)
        }))
    }
}

/// Source of notification settings
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Current settings, read fresh on every call
    async fn snapshot(&self) -> AppResult<Settings>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let settings = Settings::from_pairs([
            (SMTP_HOST, "  "),
            (ALERT_EMAIL, " ops@example.com "),
            (WEBHOOK_URL, ""),
        ]);
        assert_eq!(settings.get(SMTP_HOST), None);
        assert_eq!(settings.get(WEBHOOK_URL), None);
        assert_eq!(settings.get(SMS_SID), None);
        assert_eq!(settings.get(ALERT_EMAIL), Some("ops@example.com"));
    }

    #[test]
    fn test_known_keys() {
        assert!(is_known_key(SMS_TOKEN));
        assert!(!is_known_key("TWILIO_SID"));
        assert!(SECRET_KEYS.iter().all(|key| is_known_key(key)));
    }
}
