use std::env;

use crate::error::AppError;
use crate::models::order::DeliveryTime;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub engine: EngineConfig,
    pub daily_reset_at: DeliveryTime,
    pub monthly_reset_day: u32,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub conflict_window_minutes: u16,
    pub assign_max_attempts: u32,
    pub assign_retry_backoff_ms: u64,
    pub activation_batch_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_window_minutes: 60,
            assign_max_attempts: 3,
            assign_retry_backoff_ms: 50,
            activation_batch_cap: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = EngineConfig::default();

        let daily_reset_at: DeliveryTime = env::var("DAILY_RESET_AT")
            .unwrap_or_else(|_| "03:30".to_string())
            .parse()?;

        let monthly_reset_day: u32 = parse_or_default("MONTHLY_RESET_DAY", 1)?;
        if !(1..=28).contains(&monthly_reset_day) {
            return Err(AppError::Internal(format!(
                "MONTHLY_RESET_DAY must be within 1..=28, got {monthly_reset_day}"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            engine: EngineConfig {
                conflict_window_minutes: parse_or_default(
                    "CONFLICT_WINDOW_MIN",
                    defaults.conflict_window_minutes,
                )?,
                assign_max_attempts: parse_or_default(
                    "ASSIGN_MAX_ATTEMPTS",
                    defaults.assign_max_attempts,
                )?,
                assign_retry_backoff_ms: parse_or_default(
                    "ASSIGN_RETRY_BACKOFF_MS",
                    defaults.assign_retry_backoff_ms,
                )?,
                activation_batch_cap: parse_or_default(
                    "ACTIVATION_BATCH_CAP",
                    defaults.activation_batch_cap,
                )?,
            },
            daily_reset_at,
            monthly_reset_day,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
