// config.rs
use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "memory" | "mem" => Ok(Backend::Memory),
            other => Err(format!("unknown storage backend {other}")),
        }
    }
}

/// Abuse limits applied by the vote processor.
#[derive(Debug, Clone, Copy)]
pub struct VotePolicy {
    /// Votes one IP may cast inside `rate_window`, across all polls.
    pub max_votes_per_window: i64,
    pub rate_window: chrono::Duration,
    /// Ledger entries older than this are purged.
    pub retention: chrono::Duration,
}

/// Longest accepted rate-limit window.
pub const MAX_RATE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;
/// Longest accepted ledger retention.
pub const MAX_RETENTION_DAYS: i64 = 3650;

impl VotePolicy {
    /// Builds a policy from raw limits, rejecting values that are not
    /// positive or exceed the accepted maxima.
    pub fn from_limits(
        max_votes_per_window: i64,
        window_secs: i64,
        retention_days: i64,
    ) -> Result<Self, ConfigError> {
        let max_votes_per_window = in_range("RATE_LIMIT_MAX_VOTES", max_votes_per_window, 1, i64::MAX)?;
        let window_secs = in_range("RATE_LIMIT_WINDOW_SECS", window_secs, 1, MAX_RATE_WINDOW_SECS)?;
        let retention_days = in_range("VOTE_RETENTION_DAYS", retention_days, 1, MAX_RETENTION_DAYS)?;

        let rate_window = chrono::Duration::try_seconds(window_secs)
            .ok_or_else(|| out_of_range("RATE_LIMIT_WINDOW_SECS", window_secs))?;
        let retention = chrono::Duration::try_days(retention_days)
            .ok_or_else(|| out_of_range("VOTE_RETENTION_DAYS", retention_days))?;

        Ok(VotePolicy {
            max_votes_per_window,
            rate_window,
            retention,
        })
    }
}

fn out_of_range(key: &'static str, value: i64) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "out of range".to_string(),
    }
}

fn in_range(key: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        warn!("{key} must be between {min} and {max}, got {value}");
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must be between {min} and {max}"),
        })
    }
}

impl Default for VotePolicy {
    fn default() -> Self {
        VotePolicy {
            max_votes_per_window: 10,
            rate_window: chrono::Duration::minutes(60),
            retention: chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub cors_origin: Option<String>,
    pub policy: VotePolicy,
    pub retention_sweep: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let backend: Backend = try_load("STORAGE_BACKEND", "postgres")?;
        let database_url = var("DATABASE_URL");
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing { key: "DATABASE_URL" });
        }

        let policy = VotePolicy::from_limits(
            try_load("RATE_LIMIT_MAX_VOTES", "10")?,
            try_load("RATE_LIMIT_WINDOW_SECS", "3600")?,
            try_load("VOTE_RETENTION_DAYS", "30")?,
        )?;
        let sweep_secs: u64 = try_load("RETENTION_SWEEP_SECS", "3600")?;

        Ok(Self {
            port: try_load("PORT", "3030")?,
            backend,
            database_url,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            cors_origin: var("CORS_ALLOWED_ORIGIN"),
            policy,
            retention_sweep: Duration::from_secs(sweep_secs.max(1)),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!("postgres".parse::<Backend>(), Ok(Backend::Postgres));
        assert_eq!("Memory".parse::<Backend>(), Ok(Backend::Memory));
        assert!("redis".parse::<Backend>().is_err());
    }

    #[test]
    fn default_policy_matches_documented_limits() {
        let policy = VotePolicy::default();
        assert_eq!(policy.max_votes_per_window, 10);
        assert_eq!(policy.rate_window, chrono::Duration::hours(1));
        assert_eq!(policy.retention, chrono::Duration::days(30));
    }

    #[test]
    fn limits_within_range_build_a_policy() {
        let policy = VotePolicy::from_limits(5, 900, 7).unwrap();
        assert_eq!(policy.max_votes_per_window, 5);
        assert_eq!(policy.rate_window, chrono::Duration::minutes(15));
        assert_eq!(policy.retention, chrono::Duration::days(7));

        assert!(VotePolicy::from_limits(1, MAX_RATE_WINDOW_SECS, MAX_RETENTION_DAYS).is_ok());
    }

    #[rstest::rstest]
    #[case::zero_votes(0, 3600, 30, "RATE_LIMIT_MAX_VOTES")]
    #[case::zero_window(10, 0, 30, "RATE_LIMIT_WINDOW_SECS")]
    #[case::negative_window(10, -60, 30, "RATE_LIMIT_WINDOW_SECS")]
    #[case::huge_window(10, 10_000_000_000_000, 30, "RATE_LIMIT_WINDOW_SECS")]
    #[case::zero_retention(10, 3600, 0, "VOTE_RETENTION_DAYS")]
    #[case::negative_retention(10, 3600, -30, "VOTE_RETENTION_DAYS")]
    #[case::huge_retention(10, 3600, i64::MAX, "VOTE_RETENTION_DAYS")]
    fn limits_out_of_range_are_rejected(
        #[case] max_votes: i64,
        #[case] window_secs: i64,
        #[case] retention_days: i64,
        #[case] expected_key: &str,
    ) {
        match VotePolicy::from_limits(max_votes, window_secs, retention_days) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected {expected_key} to be rejected, got {other:?}"),
        }
    }
}
