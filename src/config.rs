use std::{net::IpAddr, time::Duration};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) environment variable is not set.")]
    MissingApiKey,
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Sessions untouched for this long are reclaimed.
    pub session_ttl: Duration,
}

impl Config {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = non_blank("GEMINI_API_KEY")
            .or_else(|| non_blank("API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            api_key,
            model: non_blank("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_blank("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            request_timeout: Duration::from_secs(parse_or(&non_blank, "GEMINI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
            bind_addr: parse_or(&non_blank, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&non_blank, "PORT", DEFAULT_PORT)?,
            max_upload_bytes: parse_or(&non_blank, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            session_ttl: Duration::from_secs(parse_or(&non_blank, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?),
        })
    }

    pub fn redacted_key(&self) -> String {
        format!("{}...", self.api_key.chars().take(4).collect::<String>())
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_key_is_fatal() {
        assert_eq!(config_from(&[]).unwrap_err(), ConfigError::MissingApiKey);
        assert_eq!(config_from(&[("GEMINI_API_KEY", "   ")]).unwrap_err(), ConfigError::MissingApiKey);
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("API_KEY", "secret-key")]).unwrap();
        assert_eq!(config.api_key, "secret-key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.session_ttl, Duration::from_secs(DEFAULT_SESSION_TTL_SECS));
        assert_eq!(config.redacted_key(), "secr...");
    }

    #[test]
    fn gemini_key_wins_and_overrides_parse() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "primary"),
            ("API_KEY", "fallback"),
            ("PORT", "9090"),
            ("BIND_ADDR", "127.0.0.1"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("SESSION_TTL_SECS", "90"),
        ])
        .unwrap();
        assert_eq!(config.api_key, "primary");
        assert_eq!(config.port, 9090);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.session_ttl, Duration::from_secs(90));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config_from(&[("API_KEY", "k"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid { name: "PORT", value: "eighty".into() });
    }
}
