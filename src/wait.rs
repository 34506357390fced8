//! Rich timeout errors with debugging context
//!
//! When a convergence wait gives up, the error says what was being waited
//! for, what was last seen, and how much of the budget was spent.
//!
//! # Example
//!
//! ```ignore
//! match fixture.setup().await {
//!     Err(LifecycleError::AdoptionTimeout(err)) => {
//!         println!("Resource: {}", err.resource);
//!         println!("Last state: {}", err.last_state);
//!         println!("Attempts: {}", err.attempts);
//!     }
//!     _ => {}
//! }
//! ```

use crate::config::WaitPolicy;
use std::fmt;
use std::time::Duration;

/// Context for a wait that ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimeout {
    /// What was awaited (e.g., "adoption of activities/default/x")
    pub resource: String,
    /// Description of the last observed state
    pub last_state: String,
    /// Attempts made
    pub attempts: u32,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The configured budget (`attempts * interval`)
    pub budget: Duration,
}

impl WaitTimeout {
    pub fn new(resource: impl Into<String>, policy: &WaitPolicy) -> Self {
        Self {
            resource: resource.into(),
            last_state: "unknown".to_string(),
            attempts: policy.max_attempts,
            elapsed: Duration::ZERO,
            budget: policy.budget(),
        }
    }

    /// Set the last observed state
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }

    /// Record attempts and elapsed time from the wait itself
    #[must_use]
    pub fn with_progress(mut self, attempts: u32, elapsed: Duration) -> Self {
        self.attempts = attempts;
        self.elapsed = elapsed;
        self
    }
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {}", self.resource)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Attempts: {}", self.attempts)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        write!(f, "└─ Budget: {:?}", self.budget)
    }
}

impl std::error::Error for WaitTimeout {}
