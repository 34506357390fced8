//! Bounded polling for eventual consistency
//!
//! The controller and the remote service both converge asynchronously, so
//! every "has it happened yet" question is asked repeatedly with a fixed
//! interval and a fixed number of attempts. There is no backoff and no jitter:
//! the overall budget is exactly `max_attempts * interval`.
//!
//! The wait blocks the calling test (not the runtime) and cannot be cancelled
//! mid-sleep except by dropping the future.
//!
//! # Example
//!
//! ```ignore
//! use sfn_e2e::eventually::eventually;
//! use std::time::Duration;
//!
//! let outcome = eventually(|| async { probe.probe(&arn).await.is_absent() })
//!     .max_attempts(12)
//!     .interval(Duration::from_secs(5))
//!     .wait()
//!     .await;
//!
//! assert!(outcome.is_settled());
//! ```

use crate::config::WaitPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T = ()> {
    /// The condition held on attempt `attempts`
    Settled { value: T, attempts: u32 },
    /// Every attempt failed
    TimedOut { attempts: u32, elapsed: Duration },
}

impl<T> WaitOutcome<T> {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Settled { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// The settled value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Settled { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }
}

/// Poll `check` until it yields a value or the policy is exhausted
///
/// Each attempt runs `check` once; on `None` it sleeps `interval` unless that
/// was the last attempt. A policy with zero attempts still checks once.
pub async fn poll<T, F, Fut>(policy: &WaitPolicy, mut check: F) -> WaitOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if let Some(value) = check().await {
            debug!(attempt, elapsed = ?start.elapsed(), "Condition settled");
            return WaitOutcome::Settled {
                value,
                attempts: attempt,
            };
        }

        if attempt < max_attempts {
            debug!(
                attempt,
                max_attempts,
                interval = ?policy.interval,
                "Condition not met, waiting"
            );
            sleep(policy.interval).await;
        }
    }

    WaitOutcome::TimedOut {
        attempts: max_attempts,
        elapsed: start.elapsed(),
    }
}

/// Builder for boolean waits
pub struct Eventually<F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    condition: F,
    policy: WaitPolicy,
}

/// Create a wait that retries until `condition` returns true
///
/// Default: 6 attempts, 5 seconds apart.
pub fn eventually<F, Fut>(condition: F) -> Eventually<F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    Eventually {
        condition,
        policy: WaitPolicy::default(),
    }
}

impl<F, Fut> Eventually<F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    /// Set the number of attempts
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the fixed interval between attempts
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.policy.interval = interval;
        self
    }

    /// Take attempts and interval from a policy
    #[must_use]
    pub fn policy(mut self, policy: &WaitPolicy) -> Self {
        self.policy = *policy;
        self
    }

    /// Run the wait
    pub async fn wait(self) -> WaitOutcome {
        let Self {
            mut condition,
            policy,
        } = self;

        poll(&policy, || {
            let fut = condition();
            async move { fut.await.then_some(()) }
        })
        .await
    }
}
