use std::env;
use std::time::Duration;

use crate::constants::{
    API_V0_BASE_URL, API_V1_BASE_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, MAX_DELAY_SECS,
    MAX_RETRIES, PER_PAGE_RESULTS, REQUESTS_PER_DAY, REQUESTS_PER_MINUTE, REQUESTS_PER_SECOND,
};
use crate::error::Result;
use crate::rate_limit::{RateLimit, RateLimiter};
use crate::transport::DryRunMode;

/// Client configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rest_base_url: String,
    pub node_base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub per_page: u32,
    pub dry_run: DryRunMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_base_url: API_V0_BASE_URL.to_string(),
            node_base_url: API_V1_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            requests_per_second: REQUESTS_PER_SECOND,
            requests_per_minute: REQUESTS_PER_MINUTE,
            requests_per_day: REQUESTS_PER_DAY,
            max_delay: Duration::from_secs(MAX_DELAY_SECS),
            max_retries: MAX_RETRIES,
            per_page: PER_PAGE_RESULTS,
            dry_run: DryRunMode::Off,
        }
    }
}

/// Set, non-empty, and not "false" or "none"
fn env_to_bool(value: Option<String>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim().to_lowercase();
        !v.is_empty() && v != "false" && v != "none"
    })
}

impl ClientConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key lookup; missing or unparseable values keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let count = |key: &str, default: u32| {
            number(key)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(default)
        };

        let user_agent = lookup("INAT_USER_AGENT")
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(defaults.user_agent);

        let timeout = number("INAT_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_delay = number("INAT_MAX_DELAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_delay);

        let dry_run = if env_to_bool(lookup("DRY_RUN_ENABLED")) {
            DryRunMode::All
        } else if env_to_bool(lookup("DRY_RUN_WRITE_ONLY")) {
            DryRunMode::WriteOnly
        } else {
            DryRunMode::Off
        };

        Self {
            rest_base_url: defaults.rest_base_url,
            node_base_url: defaults.node_base_url,
            user_agent,
            timeout,
            requests_per_second: count("INAT_REQUESTS_PER_SECOND", defaults.requests_per_second),
            requests_per_minute: count("INAT_REQUESTS_PER_MINUTE", defaults.requests_per_minute),
            requests_per_day: count("INAT_REQUESTS_PER_DAY", defaults.requests_per_day),
            max_delay,
            max_retries: count("INAT_MAX_RETRIES", defaults.max_retries),
            per_page: defaults.per_page,
            dry_run,
        }
    }

    pub fn rate_limits(&self) -> Vec<RateLimit> {
        vec![
            RateLimit::per_second(self.requests_per_second),
            RateLimit::per_minute(self.requests_per_minute),
            RateLimit::per_day(self.requests_per_day),
        ]
    }

    /// A limiter for these windows; fails if any window has zero capacity
    pub fn rate_limiter(&self) -> Result<RateLimiter> {
        Ok(RateLimiter::new(self.rate_limits())?.with_max_delay(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.dry_run, DryRunMode::Off);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("INAT_USER_AGENT", "my-app/2.0"),
            ("INAT_TIMEOUT_SECS", "5"),
            ("INAT_REQUESTS_PER_SECOND", "3"),
            ("INAT_MAX_RETRIES", "not-a-number"),
        ]);
        assert_eq!(config.user_agent, "my-app/2.0");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.requests_per_second, 3);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_dry_run_flags() {
        assert_eq!(config_from(&[("DRY_RUN_ENABLED", "true")]).dry_run, DryRunMode::All);
        assert_eq!(config_from(&[("DRY_RUN_ENABLED", "1")]).dry_run, DryRunMode::All);
        assert_eq!(config_from(&[("DRY_RUN_ENABLED", "False")]).dry_run, DryRunMode::Off);
        assert_eq!(config_from(&[("DRY_RUN_ENABLED", "none")]).dry_run, DryRunMode::Off);
        assert_eq!(config_from(&[("DRY_RUN_ENABLED", "")]).dry_run, DryRunMode::Off);
        assert_eq!(
            config_from(&[("DRY_RUN_WRITE_ONLY", "yes")]).dry_run,
            DryRunMode::WriteOnly
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = config_from(&[("INAT_REQUESTS_PER_DAY", "0")]);
        assert!(config.rate_limiter().is_err());
    }
}
