use super::{Lifecycle, LifecycleError, LifecycleState, Resource};
use crate::eventually::{poll, WaitOutcome};
use crate::kube_client::ClientError;
use crate::probe::ProbeOutcome;
use crate::resource::ObservedResource;
use crate::wait::WaitTimeout;
use tracing::{debug, info, instrument, warn};

impl Lifecycle {
    /// Create the CR, wait for adoption, and verify the remote object
    ///
    /// On any failure after the create call succeeded, teardown runs before
    /// the error is returned. A failed create triggers one best-effort delete
    /// in case the API server persisted the object anyway, unless the name
    /// was already taken: that resource belongs to someone else.
    #[instrument(skip(self), fields(resource = %self.desired.reference()))]
    pub async fn setup(&mut self) -> Result<Resource, LifecycleError> {
        if self.state != LifecycleState::Init {
            return Err(LifecycleError::InvalidState(self.state));
        }

        let reference = self.desired.reference().clone();

        if let Err(source) = self.harness.kube().create(&self.desired).await {
            if matches!(source, ClientError::AlreadyExists(_)) {
                warn!(error = %source, "Create conflicted with an existing resource");
                self.teardown_attempted = true;
                self.state = LifecycleState::TornDown;
            } else {
                warn!(error = %source, "Create failed, attempting best-effort cleanup");
                self.cleanup_failed_create().await;
            }
            return Err(LifecycleError::Create {
                reference: reference.to_string(),
                source,
            });
        }

        self.state = LifecycleState::Created;
        info!("Created, waiting for controller adoption");

        let (observed, identifier) = match self.wait_for_adoption().await {
            Ok(adopted) => adopted,
            Err(e) => {
                self.teardown().await;
                return Err(e);
            }
        };

        self.identifier = Some(identifier.clone());
        self.state = LifecycleState::Adopted;
        info!(identifier = %identifier, "Adopted by controller");

        if let Err(e) = self.verify(&identifier).await {
            self.teardown().await;
            return Err(e);
        }

        self.state = LifecycleState::Verified;
        info!(identifier = %identifier, "Remote object verified");

        Ok(Resource::new(
            self.harness.clone(),
            self.kind.clone(),
            observed,
            identifier,
        ))
    }

    async fn wait_for_adoption(&self) -> Result<(ObservedResource, String), LifecycleError> {
        let kube = self.harness.kube();
        let reference = self.desired.reference();
        let kind = &self.kind;
        let policy = self.harness.config().adoption;

        let outcome = poll(&policy, || async move {
            match kube.get(reference).await {
                Ok(Some(observed)) => kind
                    .identifier_of(&observed)
                    .map(|identifier| (observed, identifier)),
                Ok(None) => None,
                Err(e) => {
                    debug!(error = %e, "Read during adoption wait failed");
                    None
                }
            }
        })
        .await;

        match outcome {
            WaitOutcome::Settled { value, .. } => Ok(value),
            WaitOutcome::TimedOut { attempts, elapsed } => {
                let last_state = match kube.get(reference).await {
                    Ok(Some(observed)) => observed.state_description(),
                    Ok(None) => "resource not found".to_string(),
                    Err(e) => e.to_string(),
                };
                Err(LifecycleError::AdoptionTimeout(
                    WaitTimeout::new(format!("adoption of {reference}"), &policy)
                        .with_state(last_state)
                        .with_progress(attempts, elapsed),
                ))
            }
        }
    }

    async fn verify(&self, identifier: &str) -> Result<(), LifecycleError> {
        let expected = self.desired.name();
        let outcome = self.harness.probe(&self.kind).probe(identifier).await;

        match &outcome {
            ProbeOutcome::Found(obj) if obj.name == expected => Ok(()),
            _ => Err(LifecycleError::VerificationMismatch {
                identifier: identifier.to_string(),
                expected: expected.to_string(),
                observed: outcome.describe(),
            }),
        }
    }

    async fn cleanup_failed_create(&mut self) {
        let reference = self.desired.reference();
        match self.harness.kube().delete(reference).await {
            Ok(true) => info!("Removed partially created resource"),
            Ok(false) => debug!("Nothing persisted by failed create"),
            Err(e) => warn!(error = %e, "Best-effort cleanup after failed create failed"),
        }
        self.teardown_attempted = true;
        self.state = LifecycleState::TornDown;
    }
}
