use std::env;
use std::time::Duration;

use crate::quota::QuotaLimits;

pub const DEFAULT_API_URL: &str = "https://api.twelvedata.com";

/// Runtime configuration for the quote client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_keys: Vec<String>,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub limits: QuotaLimits,
    /// Per-key daily checkout budget; `None` means unlimited.
    pub max_per_key: Option<u32>,
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - TWELVE_DATA_API_KEYS (comma-separated) or TWELVE_DATA_API_KEY [required]
    /// - TWELVE_DATA_API_URL (default: https://api.twelvedata.com)
    /// - TWELVE_DATA_HTTP_TIMEOUT_SECS (default: 10)
    /// - TWELVE_DATA_USER_AGENT (default: market-quotes/<version>)
    /// - QUOTES_MAX_PER_MINUTE (default: 7)
    /// - QUOTES_MAX_PER_DAY (default: 750)
    /// - QUOTES_REQUEST_DELAY_SECS (default: 8)
    /// - QUOTES_MAX_PER_KEY (default: unlimited)
    pub fn from_env() -> Result<Self, String> {
        let api_keys = env::var("TWELVE_DATA_API_KEYS")
            .or_else(|_| env::var("TWELVE_DATA_API_KEY"))
            .map(|raw| parse_key_list(&raw))
            .map_err(|_| "Missing TWELVE_DATA_API_KEYS or TWELVE_DATA_API_KEY".to_string())?;
        if api_keys.is_empty() {
            return Err("TWELVE_DATA_API_KEYS contains no usable keys".to_string());
        }

        let api_url = env::var("TWELVE_DATA_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let timeout_secs = parse_u64("TWELVE_DATA_HTTP_TIMEOUT_SECS")?.unwrap_or(10);
        let default_ua = format!("market-quotes/{}", env!("CARGO_PKG_VERSION"));
        let user_agent = env::var("TWELVE_DATA_USER_AGENT").unwrap_or(default_ua);

        let defaults = QuotaLimits::default();
        let per_minute = parse_in_range::<usize>("QUOTES_MAX_PER_MINUTE")?
            .unwrap_or(defaults.per_minute);
        let per_day = parse_in_range::<u32>("QUOTES_MAX_PER_DAY")?.unwrap_or(defaults.per_day);
        let request_delay = parse_u64("QUOTES_REQUEST_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_delay);
        if per_minute == 0 || per_day == 0 {
            return Err("QUOTES_MAX_PER_MINUTE and QUOTES_MAX_PER_DAY must be positive".to_string());
        }
        let max_per_key = parse_in_range::<u32>("QUOTES_MAX_PER_KEY")?;

        Ok(Self {
            api_keys,
            api_url,
            user_agent,
            timeout_secs,
            limits: QuotaLimits {
                per_minute,
                per_day,
                request_delay,
            },
            max_per_key,
        })
    }

    /// Configuration for a single key against a given base URL, default limits.
    pub fn with_key(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            api_keys: vec![api_key.into()],
            api_url: api_url.into(),
            user_agent: format!("market-quotes/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
            limits: QuotaLimits::default(),
            max_per_key: None,
        }
    }
}

fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(var: &str) -> Result<Option<u64>, String> {
    match env::var(var) {
        Ok(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("{var} must be a non-negative integer, got {s:?}")),
        Err(_) => Ok(None),
    }
}

fn parse_in_range<T: TryFrom<u64>>(var: &str) -> Result<Option<T>, String> {
    match parse_u64(var)? {
        Some(v) => T::try_from(v)
            .map(Some)
            .map_err(|_| format!("{var} out of range, got {v}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_list_skips_blanks() {
        assert_eq!(parse_key_list(" a, ,b,,c "), vec!["a", "b", "c"]);
        assert!(parse_key_list(" , ").is_empty());
    }

    #[test]
    fn oversized_caps_are_rejected() {
        std::env::set_var("MARKET_QUOTES_TEST_CAP", "4294967297");
        let err = parse_in_range::<u32>("MARKET_QUOTES_TEST_CAP").unwrap_err();
        assert_eq!(err, "MARKET_QUOTES_TEST_CAP out of range, got 4294967297");

        std::env::set_var("MARKET_QUOTES_TEST_CAP", "4294967295");
        assert_eq!(
            parse_in_range::<u32>("MARKET_QUOTES_TEST_CAP").unwrap(),
            Some(u32::MAX)
        );
        std::env::remove_var("MARKET_QUOTES_TEST_CAP");
        assert_eq!(parse_in_range::<u32>("MARKET_QUOTES_TEST_CAP").unwrap(), None);
    }

    #[test]
    fn with_key_uses_default_limits() {
        let cfg = Config::with_key("k", "http://localhost");
        assert_eq!(cfg.limits.per_minute, 7);
        assert_eq!(cfg.limits.per_day, 750);
        assert_eq!(cfg.limits.request_delay, Duration::from_secs(8));
        assert_eq!(cfg.timeout_secs, 10);
        assert!(cfg.max_per_key.is_none());
    }
}
