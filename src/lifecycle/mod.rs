//! Resource lifecycle fixture
//!
//! Drives one CR through create → adoption → remote verification, hands it to
//! a test body, and always tears it down afterwards:
//!
//! ```text
//! Init ──create──▶ Created ──status has identifier──▶ Adopted ──remote matches──▶ Verified
//!   │                 │                                  │                          │
//!   └─────────────────┴──────────── any failure ─────────┴────────── body done ─────┴──▶ TornDown
//! ```
//!
//! Failures before the create call succeeds propagate directly. Anything
//! after that goes through teardown first, so a created remote object is
//! never left behind unreported. Teardown itself never fails.
//!
//! # Example
//!
//! ```ignore
//! let desired = sfn::activity_desired(&harness)?;
//! harness
//!     .lifecycle(sfn::activity(), desired)
//!     .run(|mut resource| async move {
//!         assert!(resource.exists().await);
//!         resource.set_tags(&new_tags).await?;
//!         resource.wait_for_tags(&new_tags).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

mod handle;
mod setup;
mod teardown;

pub use handle::Resource;
pub use teardown::TeardownOutcome;

use crate::harness::Harness;
use crate::kube_client::ClientError;
use crate::remote::RemoteError;
use crate::resource::{DesiredResource, ResourceKind, ResourceRef};
use crate::wait::WaitTimeout;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::warn;

/// Error type test bodies return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where a fixture is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Created,
    Adopted,
    Verified,
    TornDown,
}

/// Errors from lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Failed to create {reference}: {source}")]
    Create {
        reference: String,
        #[source]
        source: ClientError,
    },

    #[error("Controller never adopted the resource:{0}")]
    AdoptionTimeout(WaitTimeout),

    #[error("Remote object {identifier} does not match: expected name '{expected}', {observed}")]
    VerificationMismatch {
        identifier: String,
        expected: String,
        observed: String,
    },

    #[error("{0} no longer exists")]
    Gone(String),

    #[error(transparent)]
    Kube(#[from] ClientError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Invalid tags in spec: {0}")]
    InvalidTags(String),

    #[error("Remote side did not converge:{0}")]
    ConvergenceTimeout(WaitTimeout),

    #[error("Deletion did not settle:{0}")]
    DeletionTimeout(WaitTimeout),

    #[error("setup() called in state {0:?}")]
    InvalidState(LifecycleState),

    #[error("Test body failed: {0}")]
    Body(BoxError),
}

/// Fixture for one resource instance
pub struct Lifecycle {
    harness: Harness,
    kind: ResourceKind,
    desired: DesiredResource,
    state: LifecycleState,
    identifier: Option<String>,
    teardown_attempted: bool,
}

impl Lifecycle {
    pub fn new(harness: Harness, kind: ResourceKind, desired: DesiredResource) -> Self {
        Self {
            harness,
            kind,
            desired,
            state: LifecycleState::Init,
            identifier: None,
            teardown_attempted: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn reference(&self) -> &ResourceRef {
        self.desired.reference()
    }

    /// Remote identifier, once adopted
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Set up, run `body`, and tear down no matter how `body` ends
    ///
    /// A panicking body is re-raised after teardown; an erroring body comes
    /// back as `LifecycleError::Body`.
    pub async fn run<F, Fut, T>(mut self, body: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(Resource) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let resource = self.setup().await?;

        let result = AssertUnwindSafe(async move { body(resource).await })
            .catch_unwind()
            .await;

        self.teardown().await;

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LifecycleError::Body(e)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let created = matches!(
            self.state,
            LifecycleState::Created | LifecycleState::Adopted | LifecycleState::Verified
        );
        if created && !self.teardown_attempted {
            warn!(
                resource = %self.desired.reference(),
                identifier = ?self.identifier,
                "Lifecycle dropped without teardown; relying on out-of-band cleanup"
            );
        }
    }
}
