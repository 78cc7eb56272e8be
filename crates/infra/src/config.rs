//! Orchestrator worker configuration.

use std::time::Duration;

use crate::orchestrator::{DEFAULT_BATCH_SIZE, DEFAULT_JOB_TIMEOUT};

pub const ENV_WORKER_NAME: &str = "MARQUEE_WORKER_NAME";
pub const ENV_POLL_INTERVAL: &str = "MARQUEE_POLL_INTERVAL_SECS";
pub const ENV_DUE_SWEEP_INTERVAL: &str = "MARQUEE_DUE_SWEEP_INTERVAL_SECS";
pub const ENV_BATCH_SIZE: &str = "MARQUEE_BATCH_SIZE";
pub const ENV_JOB_TIMEOUT: &str = "MARQUEE_JOB_TIMEOUT_SECS";
pub const ENV_STALE_CLAIM: &str = "MARQUEE_STALE_CLAIM_SECS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Thread name and log field.
    pub name: String,
    pub poll_interval: Duration,
    pub due_sweep_interval: Duration,
    pub batch_size: usize,
    /// `None` disables the per-job timeout.
    pub job_timeout: Option<Duration>,
    /// `None` disables automatic stale-claim release.
    pub stale_claim_after: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: "publishing-orchestrator".to_string(),
            poll_interval: Duration::from_secs(30),
            due_sweep_interval: Duration::from_secs(60),
            batch_size: DEFAULT_BATCH_SIZE,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            stale_claim_after: Some(Duration::from_secs(900)),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_due_sweep_interval(mut self, interval: Duration) -> Self {
        self.due_sweep_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_stale_claim_after(mut self, after: Option<Duration>) -> Self {
        self.stale_claim_after = after;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_WORKER_NAME).filter(|n| !n.trim().is_empty()) {
            config.name = name.trim().to_string();
        }
        if let Some(secs) = parse_secs(&lookup, ENV_POLL_INTERVAL)? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, ENV_DUE_SWEEP_INTERVAL)? {
            config.due_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(size) = parse_secs(&lookup, ENV_BATCH_SIZE)? {
            config.batch_size = usize::try_from(size).map_err(|_| ConfigError::OutOfRange {
                var: ENV_BATCH_SIZE,
                reason: "too large",
            })?;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_JOB_TIMEOUT)? {
            config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_secs(&lookup, ENV_STALE_CLAIM)? {
            config.stale_claim_after = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                var: ENV_POLL_INTERVAL,
                reason: "must be greater than zero",
            });
        }
        if self.due_sweep_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                var: ENV_DUE_SWEEP_INTERVAL,
                reason: "must be greater than zero",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                var: ENV_BATCH_SIZE,
                reason: "must be greater than zero",
            });
        }
        if let (Some(timeout), Some(stale)) = (self.job_timeout, self.stale_claim_after)
            && stale <= timeout
        {
            return Err(ConfigError::OutOfRange {
                var: ENV_STALE_CLAIM,
                reason: "must exceed the job timeout",
            });
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn zero_disables_timeout_and_stale_release() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (ENV_JOB_TIMEOUT, "0"),
            (ENV_STALE_CLAIM, "0"),
            (ENV_BATCH_SIZE, "25"),
            (ENV_WORKER_NAME, " worker-2 "),
        ]))
        .unwrap();

        assert_eq!(config.job_timeout, None);
        assert_eq!(config.stale_claim_after, None);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.name, "worker-2");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = OrchestratorConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL, "soon")])).unwrap_err();
        assert!(err.to_string().starts_with(ENV_POLL_INTERVAL));

        let err = OrchestratorConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::OutOfRange {
                var: ENV_BATCH_SIZE,
                reason: "must be greater than zero"
            }
        );
    }

    #[test]
    fn stale_window_must_outlast_timeout() {
        let err = OrchestratorConfig::from_lookup(lookup(&[(ENV_JOB_TIMEOUT, "600"), (ENV_STALE_CLAIM, "300")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: ENV_STALE_CLAIM, .. }));
    }
}
