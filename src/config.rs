use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::reconciliation::scheduler::MonthlyTrigger;

/// Raw values as read from defaults + environment
#[derive(Debug, Deserialize)]
struct RawConfig {
    database_url: String,
    bind_address: String,
    timezone: String,
    cors_origins: String,
    reconcile_day: u32,
    reconcile_hour: u32,
    reconcile_minute: u32,
    rate_limit_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Calendar timezone used for "today" and for the monthly trigger
    pub timezone: Tz,
    pub cors_origins: Vec<String>,
    pub trigger: MonthlyTrigger,
    pub rate_limit_per_minute: u32,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let raw: RawConfig = config::Config::builder()
            .set_default("database_url", "sqlite://data/cards.db?mode=rwc")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("timezone", "America/Indiana/Indianapolis")?
            .set_default("cors_origins", "http://localhost:3000")?
            .set_default("reconcile_day", 1)?
            .set_default("reconcile_hour", 0)?
            .set_default("reconcile_minute", 5)?
            .set_default("rate_limit_per_minute", 120)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> AppResult<Self> {
        let timezone = parse_timezone(&raw.timezone)?;

        let trigger = MonthlyTrigger::new(raw.reconcile_day, raw.reconcile_hour, raw.reconcile_minute)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "invalid reconciliation trigger: day {} at {:02}:{:02}",
                    raw.reconcile_day, raw.reconcile_hour, raw.reconcile_minute
                ))
            })?;

        let cors_origins = raw
            .cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url: raw.database_url,
            bind_address: raw.bind_address,
            timezone,
            cors_origins,
            trigger,
            rate_limit_per_minute: raw.rate_limit_per_minute.max(1),
        })
    }
}

/// Parse an IANA timezone identifier such as `America/Indiana/Indianapolis`
pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| AppError::Config(format!("unknown timezone {:?}: {}", name, e)))
}
