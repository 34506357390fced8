//! Pre-provisioned shared account resources
//!
//! Some CR specs need resources that exist before any test runs (e.g., the
//! IAM role state machines execute as). They are provisioned out of band and
//! only read here.

/// Execution role for state machines
pub const ENV_EXECUTION_ROLE_ARN: &str = "SFN_EXECUTION_ROLE_ARN";

/// Bootstrap lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap resource {0} is not provisioned (set {1})")]
    Missing(&'static str, &'static str),
}

/// Read-only view of bootstrap resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapResources {
    execution_role_arn: Option<String>,
}

impl BootstrapResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read bootstrap resources from the environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            execution_role_arn: std::env::var(ENV_EXECUTION_ROLE_ARN)
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Set the execution role explicitly
    #[must_use]
    pub fn execution_role_arn(mut self, arn: impl Into<String>) -> Self {
        self.execution_role_arn = Some(arn.into());
        self
    }

    /// The state machine execution role
    pub fn sfn_execution_role_arn(&self) -> Result<&str, BootstrapError> {
        self.execution_role_arn
            .as_deref()
            .ok_or(BootstrapError::Missing("execution role", ENV_EXECUTION_ROLE_ARN))
    }
}
