use std::{fmt, time::Duration};
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_DAILY_LIMIT: u32 = 100;
pub const DEFAULT_MINUTE_LIMIT: u32 = 10;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

/// Settings read once at startup and handed to the router and upstream client.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub daily_limit: u32,
    pub minute_limit: u32,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;
        let api_base = get("OPENROUTER_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_ALLOWED_ORIGIN.to_string()]);

        Ok(Self {
            api_key,
            api_base,
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            allowed_origins,
            daily_limit: non_zero("RATE_LIMIT_PER_DAY", get("RATE_LIMIT_PER_DAY"), DEFAULT_DAILY_LIMIT)?,
            minute_limit: non_zero("RATE_LIMIT_PER_MINUTE", get("RATE_LIMIT_PER_MINUTE"), DEFAULT_MINUTE_LIMIT)?,
            upstream_timeout: Duration::from_secs(non_zero(
                "UPSTREAM_TIMEOUT_SECS",
                get("UPSTREAM_TIMEOUT_SECS"),
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
        })
    }
}

// Keeps the key out of startup logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"***")
            .field("api_base", &self.api_base)
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("daily_limit", &self.daily_limit)
            .field("minute_limit", &self.minute_limit)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn non_zero<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let parsed = parse_or(key, raw, default)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid { key, value: "0".into(), reason: "must be greater than zero".into() });
    }
    Ok(parsed)
}
