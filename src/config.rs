//! Configuration types for the harness
//!
//! Build them programmatically, or start from `HarnessConfig::from_env()` to
//! pick up CI overrides. No config files needed.
//!
//! # Example
//!
//! ```
//! use sfn_e2e::config::{HarnessConfig, WaitPolicy};
//! use std::time::Duration;
//!
//! let config = HarnessConfig::new()
//!     .namespace("e2e")
//!     .adoption(WaitPolicy::new(10, Duration::from_secs(3)))
//!     .deletion(WaitPolicy::new(20, Duration::from_secs(3)));
//!
//! assert_eq!(config.deletion.budget(), Duration::from_secs(60));
//! ```

use crate::tags::SystemTagPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Namespace for created CRs
pub const ENV_NAMESPACE: &str = "E2E_NAMESPACE";
/// Directory holding resource templates
pub const ENV_RESOURCE_DIR: &str = "E2E_RESOURCE_DIR";
pub const ENV_CREATE_ATTEMPTS: &str = "E2E_CREATE_ATTEMPTS";
pub const ENV_CREATE_INTERVAL: &str = "E2E_CREATE_INTERVAL_SECS";
pub const ENV_UPDATE_ATTEMPTS: &str = "E2E_UPDATE_ATTEMPTS";
pub const ENV_UPDATE_INTERVAL: &str = "E2E_UPDATE_INTERVAL_SECS";
pub const ENV_DELETE_ATTEMPTS: &str = "E2E_DELETE_ATTEMPTS";
pub const ENV_DELETE_INTERVAL: &str = "E2E_DELETE_INTERVAL_SECS";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: expected a non-negative integer")]
    InvalidNumber { var: String, value: String },
}

/// Fixed-interval, attempt-bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Number of times the condition is checked
    pub max_attempts: u32,
    /// Sleep between failed checks
    pub interval: Duration,
}

impl WaitPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on wall-clock time spent waiting; saturates at `Duration::MAX`
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(5))
    }
}

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Service marker name; also the expected controller-version tag prefix
    pub service: String,

    /// Namespace CRs are created in
    pub namespace: String,

    /// Directory holding `<template>.yaml` resource templates
    pub resource_dir: PathBuf,

    /// Wait for the controller to write the remote identifier
    pub adoption: WaitPolicy,

    /// Wait for the remote side to reflect a patch
    pub update: WaitPolicy,

    /// Wait for a deletion to settle remotely
    pub deletion: WaitPolicy,

    /// Which tags the controller owns
    pub system_tags: SystemTagPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            service: "sfn".to_string(),
            namespace: "default".to_string(),
            resource_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/resources")),
            adoption: WaitPolicy::new(6, Duration::from_secs(5)),
            update: WaitPolicy::new(5, Duration::from_secs(2)),
            deletion: WaitPolicy::new(12, Duration::from_secs(5)),
            system_tags: SystemTagPolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with overrides from `E2E_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults with overrides from an arbitrary variable source
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ns) = lookup(ENV_NAMESPACE) {
            config.namespace = ns;
        }
        if let Some(dir) = lookup(ENV_RESOURCE_DIR) {
            config.resource_dir = PathBuf::from(dir);
        }

        config.adoption = policy_from(&lookup, ENV_CREATE_ATTEMPTS, ENV_CREATE_INTERVAL, config.adoption)?;
        config.update = policy_from(&lookup, ENV_UPDATE_ATTEMPTS, ENV_UPDATE_INTERVAL, config.update)?;
        config.deletion = policy_from(&lookup, ENV_DELETE_ATTEMPTS, ENV_DELETE_INTERVAL, config.deletion)?;

        Ok(config)
    }

    /// Set the service marker name
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Set the namespace
    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set the template directory
    #[must_use]
    pub fn resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = dir.into();
        self
    }

    /// Set the adoption wait
    #[must_use]
    pub fn adoption(mut self, policy: WaitPolicy) -> Self {
        self.adoption = policy;
        self
    }

    /// Set the post-patch convergence wait
    #[must_use]
    pub fn update(mut self, policy: WaitPolicy) -> Self {
        self.update = policy;
        self
    }

    /// Set the deletion settlement wait
    #[must_use]
    pub fn deletion(mut self, policy: WaitPolicy) -> Self {
        self.deletion = policy;
        self
    }

    /// Set the system tag policy
    #[must_use]
    pub fn system_tags(mut self, policy: SystemTagPolicy) -> Self {
        self.system_tags = policy;
        self
    }
}

fn policy_from<L>(
    lookup: &L,
    attempts_var: &str,
    interval_var: &str,
    fallback: WaitPolicy,
) -> Result<WaitPolicy, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let mut policy = fallback;
    if let Some(attempts) = parse_number(lookup, attempts_var)? {
        policy.max_attempts = u32::try_from(attempts).map_err(|_| ConfigError::InvalidNumber {
            var: attempts_var.to_string(),
            value: attempts.to_string(),
        })?;
    }
    if let Some(secs) = parse_number(lookup, interval_var)? {
        policy.interval = Duration::from_secs(secs);
    }
    Ok(policy)
}

fn parse_number<L>(lookup: &L, var: &str) -> Result<Option<u64>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: raw.clone(),
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_budgets() {
        let config = HarnessConfig::new();
        assert_eq!(config.service, "sfn");
        assert_eq!(config.namespace, "default");
        assert_eq!(config.adoption.budget(), Duration::from_secs(30));
        assert_eq!(config.update.budget(), Duration::from_secs(10));
        assert_eq!(config.deletion.budget(), Duration::from_secs(60));
        assert!(config.resource_dir.ends_with("resources"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            (ENV_NAMESPACE, "e2e"),
            (ENV_RESOURCE_DIR, "/tmp/templates"),
            (ENV_CREATE_ATTEMPTS, "10"),
            (ENV_DELETE_INTERVAL, " 2 "),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "e2e");
        assert_eq!(config.resource_dir, PathBuf::from("/tmp/templates"));
        assert_eq!(config.adoption.max_attempts, 10);
        assert_eq!(config.adoption.interval, Duration::from_secs(5));
        assert_eq!(config.deletion.interval, Duration::from_secs(2));
        assert_eq!(config.update, HarnessConfig::new().update);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = HarnessConfig::from_lookup(lookup(&[(ENV_UPDATE_ATTEMPTS, "many")])).unwrap_err();
        assert!(err.to_string().contains(ENV_UPDATE_ATTEMPTS));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_from_lookup_rejects_overflowing_attempts() {
        let result = HarnessConfig::from_lookup(lookup(&[(ENV_CREATE_ATTEMPTS, "99999999999")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_budget_saturates() {
        let config = HarnessConfig::from_lookup(lookup(&[
            (ENV_DELETE_ATTEMPTS, "4000000000"),
            (ENV_DELETE_INTERVAL, "18446744073709551615"),
        ]))
        .unwrap();
        assert_eq!(config.deletion.budget(), Duration::MAX);
    }

    #[test]
    fn test_builder() {
        let config = HarnessConfig::new()
            .service("sfn")
            .namespace("ns")
            .update(WaitPolicy::new(1, Duration::from_secs(1)));
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.update.budget(), Duration::from_secs(1));
    }
}
