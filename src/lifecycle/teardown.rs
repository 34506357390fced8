use super::{Lifecycle, LifecycleError, LifecycleState};
use crate::eventually::{eventually, WaitOutcome};
use crate::harness::Harness;
use crate::probe::ProbeOutcome;
use crate::resource::{ResourceKind, ResourceRef};
use crate::wait::WaitTimeout;
use tracing::{debug, info, instrument, warn};

/// What a teardown call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Nothing was ever created
    NotCreated,
    /// An earlier teardown already ran
    AlreadyTornDown,
    /// The remote object was already gone; no delete issued
    AlreadyGone,
    /// Delete issued and the remote object disappeared after `attempts` probes
    Deleted { attempts: u32 },
    /// No identifier was ever written; the CR was deleted blind
    DeletedUnverified,
    /// Cleanup failed; the error was logged and swallowed
    Failed(String),
}

impl Lifecycle {
    /// Remove the resource; safe to call any number of times and never fails
    ///
    /// If the remote object is already gone nothing is deleted. Otherwise the
    /// CR is deleted and the deletion wait runs until the remote object can no
    /// longer be observed.
    ///
    /// A probe that cannot reach the remote service does not count as gone
    /// here: the CR is still deleted, so an outage never orphans a remote
    /// object. `Probe::exists` keeps reporting such a probe as absent.
    #[instrument(skip(self), fields(resource = %self.desired.reference()))]
    pub async fn teardown(&mut self) -> TeardownOutcome {
        if self.teardown_attempted {
            debug!("Teardown already ran");
            return TeardownOutcome::AlreadyTornDown;
        }
        if self.state == LifecycleState::Init {
            return TeardownOutcome::NotCreated;
        }

        self.teardown_attempted = true;
        let outcome = self.teardown_inner().await;
        self.state = LifecycleState::TornDown;

        match &outcome {
            TeardownOutcome::Failed(reason) => {
                warn!(identifier = ?self.identifier, reason = %reason, "Teardown failed");
            }
            other => info!(outcome = ?other, "Teardown complete"),
        }
        outcome
    }

    async fn teardown_inner(&mut self) -> TeardownOutcome {
        let reference = self.desired.reference().clone();

        if self.identifier.is_none() {
            self.identifier = self.discover_identifier(&reference).await;
        }

        let Some(identifier) = self.identifier.clone() else {
            return match self.harness.kube().delete(&reference).await {
                Ok(_) => TeardownOutcome::DeletedUnverified,
                Err(e) => TeardownOutcome::Failed(e.to_string()),
            };
        };

        let probe = self.harness.probe(&self.kind);
        match probe.probe(&identifier).await {
            ProbeOutcome::NotFound => return TeardownOutcome::AlreadyGone,
            ProbeOutcome::Unreachable(reason) => {
                debug!(reason = %reason, "Remote state unknown, deleting anyway");
            }
            ProbeOutcome::Found(_) => {}
        }

        if let Err(e) = self.harness.kube().delete(&reference).await {
            return TeardownOutcome::Failed(e.to_string());
        }

        match wait_for_deletion(&self.harness, &self.kind, &reference, &identifier).await {
            Ok(attempts) => TeardownOutcome::Deleted { attempts },
            Err(e) => TeardownOutcome::Failed(e.to_string()),
        }
    }

    async fn discover_identifier(&self, reference: &ResourceRef) -> Option<String> {
        match self.harness.kube().get(reference).await {
            Ok(Some(observed)) => self.kind.identifier_of(&observed),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Could not re-read resource during teardown");
                None
            }
        }
    }
}

/// Wait until `identifier` can no longer be observed remotely
///
/// Returns the number of probes it took.
pub(super) async fn wait_for_deletion(
    harness: &Harness,
    kind: &ResourceKind,
    reference: &ResourceRef,
    identifier: &str,
) -> Result<u32, LifecycleError> {
    let probe = harness.probe(kind);
    let policy = harness.config().deletion;

    let probe_ref = &probe;
    let outcome = eventually(|| async move { probe_ref.probe(identifier).await.is_absent() })
        .policy(&policy)
        .wait()
        .await;

    match outcome {
        WaitOutcome::Settled { attempts, .. } => Ok(attempts),
        WaitOutcome::TimedOut { attempts, elapsed } => {
            let last_state = probe.probe(identifier).await.describe();
            Err(LifecycleError::DeletionTimeout(
                WaitTimeout::new(format!("deletion of {reference}"), &policy)
                    .with_state(last_state)
                    .with_progress(attempts, elapsed),
            ))
        }
    }
}
