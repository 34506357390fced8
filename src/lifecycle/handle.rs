use super::teardown::wait_for_deletion;
use super::LifecycleError;
use crate::eventually::{poll, WaitOutcome};
use crate::harness::Harness;
use crate::probe::{Probe, ProbeOutcome};
use crate::remote::RemoteObject;
use crate::resource::{ObservedResource, ResourceKind, ResourceRef};
use crate::tags::{
    check_system_tag_provenance, compute_tags_delta, equal_modulo_system_tags, ProvenanceError,
    TagSet,
};
use crate::wait::WaitTimeout;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

/// A verified resource handed to a test body
///
/// Holds the last observed snapshot of the CR plus the remote identifier the
/// controller wrote. Clones share nothing mutable; each keeps its own snapshot.
#[derive(Clone)]
pub struct Resource {
    harness: Harness,
    kind: ResourceKind,
    observed: ObservedResource,
    identifier: String,
}

impl Resource {
    pub(super) fn new(
        harness: Harness,
        kind: ResourceKind,
        observed: ObservedResource,
        identifier: String,
    ) -> Self {
        Self {
            harness,
            kind,
            observed,
            identifier,
        }
    }

    #[must_use]
    pub fn reference(&self) -> &ResourceRef {
        &self.observed.reference
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.observed.reference.name()
    }

    /// Remote identifier (ARN)
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Snapshot from adoption or the last refresh/patch
    #[must_use]
    pub fn observed(&self) -> &ObservedResource {
        &self.observed
    }

    /// Tags declared in the last observed spec
    pub fn spec_tags(&self) -> Result<TagSet, LifecycleError> {
        let raw = self.observed.spec.get("tags").unwrap_or(&Value::Null);
        TagSet::from_json(raw).map_err(|e| LifecycleError::InvalidTags(e.to_string()))
    }

    #[must_use]
    pub fn probe(&self) -> Probe {
        self.harness.probe(&self.kind)
    }

    /// Describe the remote object once
    pub async fn remote(&self) -> ProbeOutcome {
        self.probe().probe(&self.identifier).await
    }

    /// Whether the remote object is visible under this resource's name
    pub async fn exists(&self) -> bool {
        self.probe().exists(&self.identifier, self.name()).await
    }

    /// Remote tags, as the service reports them right now
    pub async fn tags(&self) -> Result<TagSet, LifecycleError> {
        Ok(self.harness.remote().list_tags(&self.identifier).await?)
    }

    /// Check the controller's system tags on `observed` point back here
    pub fn check_system_tags(&self, observed: &TagSet) -> Result<(), ProvenanceError> {
        let config = self.harness.config();
        check_system_tag_provenance(
            observed,
            &config.system_tags,
            &config.service,
            self.reference().namespace(),
        )
    }

    /// Re-read the CR
    pub async fn refresh(&mut self) -> Result<&ObservedResource, LifecycleError> {
        let reference = self.reference().clone();
        self.observed = self
            .harness
            .kube()
            .get(&reference)
            .await?
            .ok_or_else(|| LifecycleError::Gone(reference.to_string()))?;
        Ok(&self.observed)
    }

    /// Merge-patch `spec` and re-read the CR
    #[instrument(skip(self, spec_patch), fields(resource = %self.reference()))]
    pub async fn patch_spec(&mut self, spec_patch: Value) -> Result<&ObservedResource, LifecycleError> {
        let reference = self.reference().clone();
        self.harness
            .kube()
            .patch(&reference, &json!({ "spec": spec_patch }))
            .await?;
        info!("Patched spec");
        self.refresh().await
    }

    /// Replace the declared tags
    ///
    /// Merge patches replace arrays wholesale, so this is a full replacement.
    pub async fn set_tags(&mut self, tags: &TagSet) -> Result<&ObservedResource, LifecycleError> {
        self.patch_spec(json!({ "tags": tags.to_json() })).await
    }

    /// Wait until remote tags equal `desired` modulo system tags
    #[instrument(skip(self, desired), fields(resource = %self.reference()))]
    pub async fn wait_for_tags(&self, desired: &TagSet) -> Result<TagSet, LifecycleError> {
        let remote = self.harness.remote();
        let identifier = self.identifier.as_str();
        let config = self.harness.config();
        let policy = config.update;
        let system = &config.system_tags;

        let outcome = poll(&policy, || async move {
            match remote.list_tags(identifier).await {
                Ok(observed) if equal_modulo_system_tags(desired, &observed, system) => Some(observed),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "Tag read failed, retrying");
                    None
                }
            }
        })
        .await;

        match outcome {
            WaitOutcome::Settled { value, .. } => Ok(value),
            WaitOutcome::TimedOut { attempts, elapsed } => {
                let last_state = match remote.list_tags(identifier).await {
                    Ok(observed) => {
                        let delta = compute_tags_delta(&observed.without_system(system), desired);
                        format!(
                            "tags differ: to add/update {:?}, to remove {:?}",
                            delta.added_or_updated, delta.removed
                        )
                    }
                    Err(e) => e.to_string(),
                };
                Err(LifecycleError::ConvergenceTimeout(
                    WaitTimeout::new(format!("tags on {}", self.reference()), &policy)
                        .with_state(last_state)
                        .with_progress(attempts, elapsed),
                ))
            }
        }
    }

    /// Wait until the remote object satisfies `predicate`
    ///
    /// `what` names the condition in timeout errors.
    #[instrument(skip(self, predicate), fields(resource = %self.reference()))]
    pub async fn wait_for_remote<P>(&self, what: &str, predicate: P) -> Result<RemoteObject, LifecycleError>
    where
        P: Fn(&RemoteObject) -> bool,
    {
        let probe = self.probe();
        let probe_ref = &probe;
        let predicate = &predicate;
        let identifier = self.identifier.as_str();
        let policy = self.harness.config().update;

        let outcome = poll(&policy, || async move {
            match probe_ref.probe(identifier).await {
                ProbeOutcome::Found(obj) if predicate(&obj) => Some(obj),
                _ => None,
            }
        })
        .await;

        match outcome {
            WaitOutcome::Settled { value, .. } => Ok(value),
            WaitOutcome::TimedOut { attempts, elapsed } => {
                let last_state = probe.probe(identifier).await.describe();
                Err(LifecycleError::ConvergenceTimeout(
                    WaitTimeout::new(format!("{what} on {}", self.reference()), &policy)
                        .with_state(last_state)
                        .with_progress(attempts, elapsed),
                ))
            }
        }
    }

    /// Delete the CR and wait for the remote object to disappear
    ///
    /// Returns the number of probes the deletion wait took. The owning
    /// fixture's teardown later finds the object gone and does nothing.
    #[instrument(skip(self), fields(resource = %self.reference()))]
    pub async fn delete(&self) -> Result<u32, LifecycleError> {
        let deleted = self.harness.kube().delete(self.reference()).await?;
        if !deleted {
            debug!("Resource was already deleted");
        }
        wait_for_deletion(&self.harness, &self.kind, self.reference(), &self.identifier).await
    }
}
