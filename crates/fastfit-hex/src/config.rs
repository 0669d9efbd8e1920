use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::application::status_scheduler::SchedulerConfig;

pub const DEFAULT_RESTAURANT_ID: &str = "00000000-0000-0000-0000-000000000001";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub database_url: Option<String>,
    pub default_restaurant_id: Uuid,
    pub default_currency: String,
    pub progression_time_unit_ms: u64,
    pub scheduler_poll_interval_ms: u64,
    pub scheduler_max_attempts: u32,
    pub scheduler_retry_base_ms: u64,
    pub scheduler_retry_max_ms: u64,
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let database_url = env::var("DATABASE_URL").ok();
        let default_restaurant_id = parsed(
            "DEFAULT_RESTAURANT_ID",
            Uuid::from_str(DEFAULT_RESTAURANT_ID)?,
        )?;
        let default_currency = env::var("DEFAULT_CURRENCY")
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|_| "RUB".into());
        anyhow::ensure!(!default_currency.is_empty(), "DEFAULT_CURRENCY must not be empty");

        let config = Self {
            server_port,
            database_url,
            default_restaurant_id,
            default_currency,
            progression_time_unit_ms: parsed("PROGRESSION_TIME_UNIT_MS", 1000)?,
            scheduler_poll_interval_ms: parsed("SCHEDULER_POLL_INTERVAL_MS", 500)?,
            scheduler_max_attempts: parsed("SCHEDULER_MAX_ATTEMPTS", 5)?,
            scheduler_retry_base_ms: parsed("SCHEDULER_RETRY_BASE_MS", 1000)?,
            scheduler_retry_max_ms: parsed("SCHEDULER_RETRY_MAX_MS", 60_000)?,
        };
        anyhow::ensure!(
            config.scheduler_poll_interval_ms > 0,
            "SCHEDULER_POLL_INTERVAL_MS must be positive"
        );
        anyhow::ensure!(
            config.scheduler_max_attempts > 0,
            "SCHEDULER_MAX_ATTEMPTS must be positive"
        );
        Ok(config)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            time_unit: Duration::from_millis(self.progression_time_unit_ms),
            poll_interval: Duration::from_millis(self.scheduler_poll_interval_ms),
            max_attempts: self.scheduler_max_attempts,
            retry_base: Duration::from_millis(self.scheduler_retry_base_ms),
            retry_max: Duration::from_millis(self.scheduler_retry_max_ms),
            ..SchedulerConfig::default()
        }
    }
}
