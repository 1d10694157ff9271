use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rand::RngCore;

use crate::error::ConfigError;
use crate::security::{parse_limits, RateLimit};
use crate::security::rate_limit::DEFAULT_LIMITS;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub model_path: PathBuf,
    pub secret_key: Vec<u8>,
    /// False when no `SECRET_KEY` was set and one was generated for this process.
    pub secret_from_env: bool,
    pub csrf_time_limit: Duration,
    pub rate_limits: Vec<RateLimit>,
    pub log_file: PathBuf,
    pub log_predictions: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:5000".to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e: std::net::AddrParseError| invalid("BIND_ADDR", &bind_raw, e))?;

        let model_path = PathBuf::from(
            lookup("MODEL_PATH").unwrap_or_else(|| "my_saved_model.json".to_string()),
        );

        let (secret_key, secret_from_env) = match lookup("SECRET_KEY").filter(|s| !s.is_empty()) {
            Some(s) => (s.into_bytes(), true),
            None => {
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                (key, false)
            }
        };

        let csrf_time_limit = match lookup("CSRF_TIME_LIMIT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => return Err(invalid("CSRF_TIME_LIMIT_SECS", &raw, "must be positive")),
                Err(e) => return Err(invalid("CSRF_TIME_LIMIT_SECS", &raw, e)),
            },
            None => Duration::from_secs(3600),
        };

        let limits_raw = lookup("RATE_LIMITS").unwrap_or_else(|| DEFAULT_LIMITS.to_string());
        let rate_limits =
            parse_limits(&limits_raw).map_err(|e| invalid("RATE_LIMITS", &limits_raw, e))?;

        let log_file = PathBuf::from(
            lookup("LOG_FILE_PATH").unwrap_or_else(|| "security_log.log".to_string()),
        );

        let log_predictions = lookup("LOG_PREDICTIONS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "t" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            model_path,
            secret_key,
            secret_from_env,
            csrf_time_limit,
            rate_limits,
            log_file,
            log_predictions,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
