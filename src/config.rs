use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use config::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub accrual_address: String,
    /// Poll interval while the accrual service is healthy
    pub poll_interval: Duration,
    /// Poll interval while the accrual service answers nothing useful
    pub unavailable_interval: Duration,
    pub accrual_timeout: Duration,
    /// Used when a 429 carries no usable Retry-After
    pub default_retry_after: Duration,
    pub batch_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URI")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or_else(|| ConfigError::NotFound("DATABASE_URI".to_string()))?;
        let accrual_address = lookup("ACCRUAL_SYSTEM_ADDRESS")
            .ok_or_else(|| ConfigError::NotFound("ACCRUAL_SYSTEM_ADDRESS".to_string()))?;
        let bind_address = lookup("RUN_ADDRESS")
            .or_else(|| lookup("BIND_ADDRESS"))
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let poll_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", 1000)?;
        let unavailable_ms: u64 =
            parse_or(&lookup, "UNAVAILABLE_INTERVAL_MS", poll_ms.saturating_mul(10))?;
        let timeout_ms: u64 = parse_or(&lookup, "ACCRUAL_TIMEOUT_MS", 10_000)?;
        let retry_after_secs: u64 = parse_or(&lookup, "DEFAULT_RETRY_AFTER_SECS", 60)?;
        let batch_size: i64 = parse_or(&lookup, "RECONCILE_BATCH_SIZE", 100)?;

        if batch_size <= 0 {
            return Err(ConfigError::Message(format!(
                "RECONCILE_BATCH_SIZE must be positive, got {}",
                batch_size
            )));
        }

        Ok(Self {
            database_url,
            bind_address,
            accrual_address,
            poll_interval: Duration::from_millis(poll_ms),
            unavailable_interval: Duration::from_millis(unavailable_ms),
            accrual_timeout: Duration::from_millis(timeout_ms),
            default_retry_after: Duration::from_secs(retry_after_secs),
            batch_size,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::Message(format!("Invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DATABASE_URI", "postgres://localhost/accrual"),
            ("ACCRUAL_SYSTEM_ADDRESS", "http://localhost:8081"),
        ])
        .unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.unavailable_interval, Duration::from_secs(10));
        assert_eq!(config.accrual_timeout, Duration::from_secs(10));
        assert_eq!(config.default_retry_after, Duration::from_secs(60));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_fallback_keys_and_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/accrual"),
            ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual"),
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("POLL_INTERVAL_MS", "250"),
            ("RECONCILE_BATCH_SIZE", "10"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://db/accrual");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.unavailable_interval, Duration::from_millis(2500));
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_missing_and_malformed_values() {
        assert!(matches!(
            load(&[("ACCRUAL_SYSTEM_ADDRESS", "http://accrual")]),
            Err(ConfigError::NotFound(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URI", "postgres://db"),
                ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual"),
                ("POLL_INTERVAL_MS", "fast"),
            ]),
            Err(ConfigError::Message(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URI", "postgres://db"),
                ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual"),
                ("RECONCILE_BATCH_SIZE", "0"),
            ]),
            Err(ConfigError::Message(_))
        ));
    }
}
