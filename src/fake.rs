//! In-memory control plane for offline tests
//!
//! `FakeControlPlane` plays all three parties at once: the API server
//! (`ResourceClient`), the controller (adopts CRs, pushes spec changes,
//! deletes remote objects), and the remote service (`RemoteService`). Every
//! lag is counted in reads rather than time, so tests are deterministic under
//! a paused tokio clock.
//!
//! # Example
//!
//! ```ignore
//! let fake = FakeControlPlane::with_behavior(FakeBehavior {
//!     never_adopt: true,
//!     ..FakeBehavior::default()
//! });
//! let harness = fake.harness(HarnessConfig::new());
//! ```

use crate::config::HarnessConfig;
use crate::harness::Harness;
use crate::kube_client::{ClientError, ResourceClient};
use crate::remote::{RemoteError, RemoteObject, RemoteService};
use crate::resource::{DesiredResource, ObservedResource, RemoteKind, ResourceRef};
use crate::tags::{TagSet, CONTROLLER_VERSION_TAG, NAMESPACE_TAG};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the simulated controller and service behave
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// CR reads before the controller writes status
    pub adopt_after_reads: u32,
    /// Remote reads that still show the old state after a patch
    pub converge_after_reads: u32,
    /// Remote describes that still find an object after its CR is deleted
    pub settle_after_reads: u32,
    /// The controller never writes status
    pub never_adopt: bool,
    /// Remote objects get this name instead of the CR's
    pub remote_name: Option<String>,
    /// Create calls fail with this message
    pub fail_create: Option<String>,
    /// Delete calls fail with this message
    pub fail_delete: Option<String>,
    /// Remote calls fail with a transport error
    pub unreachable: bool,
    /// Value of the controller-version system tag
    pub controller_version: String,
    pub account: String,
    pub region: String,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            adopt_after_reads: 2,
            converge_after_reads: 1,
            settle_after_reads: 1,
            never_adopt: false,
            remote_name: None,
            fail_create: None,
            fail_delete: None,
            unreachable: false,
            controller_version: "sfn-v0.0.0".to_string(),
            account: "000000000000".to_string(),
            region: "us-west-2".to_string(),
        }
    }
}

/// How many times each operation was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: u32,
    pub get: u32,
    pub patch: u32,
    pub delete: u32,
    pub describe: u32,
    pub list_tags: u32,
}

struct CustomResource {
    remote_kind: RemoteKind,
    spec: Value,
    status: Value,
    reads: u32,
}

struct Pending {
    tags: TagSet,
    configuration: Value,
    remaining: u32,
}

struct RemoteRecord {
    object: RemoteObject,
    tags: TagSet,
    pending: Option<Pending>,
    /// Describes left before a deleted object disappears
    deleting: Option<u32>,
}

#[derive(Default)]
struct State {
    behavior: FakeBehavior,
    resources: HashMap<ResourceRef, CustomResource>,
    remote: HashMap<String, RemoteRecord>,
    calls: CallCounts,
}

/// Cluster, controller, and remote service in one process
#[derive(Clone, Default)]
pub struct FakeControlPlane {
    inner: Arc<Mutex<State>>,
}

impl FakeControlPlane {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        let fake = Self::new();
        fake.state().behavior = behavior;
        fake
    }

    /// A harness whose both clients are this fake
    #[must_use]
    pub fn harness(&self, config: HarnessConfig) -> Harness {
        Harness::new(Arc::new(self.clone()), Arc::new(self.clone()), config)
    }

    /// Change behavior mid-test
    pub fn update_behavior(&self, f: impl FnOnce(&mut FakeBehavior)) {
        f(&mut self.state().behavior);
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    #[must_use]
    pub fn resource_exists(&self, reference: &ResourceRef) -> bool {
        self.state().resources.contains_key(reference)
    }

    /// Whether the remote object is still recorded, ignoring settle lag
    #[must_use]
    pub fn remote_exists(&self, identifier: &str) -> bool {
        self.state().remote.contains_key(identifier)
    }

    #[must_use]
    pub fn remote_count(&self) -> usize {
        self.state().remote.len()
    }

    /// Delete a remote object out of band
    pub fn forget_remote(&self, identifier: &str) {
        self.state().remote.remove(identifier);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn observed(&self, reference: &ResourceRef) -> Option<ObservedResource> {
        self.resources.get(reference).map(|cr| {
            ObservedResource::new(reference.clone(), cr.spec.clone(), cr.status.clone())
        })
    }

    fn arn(&self, kind: RemoteKind, name: &str) -> String {
        format!(
            "arn:aws:states:{}:{}:{}:{name}",
            self.behavior.region,
            self.behavior.account,
            kind.arn_segment()
        )
    }

    fn desired_tags(&self, reference: &ResourceRef, spec: &Value) -> TagSet {
        TagSet::from_json(spec.get("tags").unwrap_or(&Value::Null))
            .unwrap_or_default()
            .with(CONTROLLER_VERSION_TAG, &self.behavior.controller_version)
            .with(NAMESPACE_TAG, reference.namespace())
    }

    /// Play the controller's part for one CR read
    fn reconcile(&mut self, reference: &ResourceRef) {
        let never_adopt = self.behavior.never_adopt;
        let adopt_after = self.behavior.adopt_after_reads;

        let Some(cr) = self.resources.get_mut(reference) else {
            return;
        };
        cr.reads += 1;
        if never_adopt || !cr.status.is_null() || cr.reads < adopt_after {
            return;
        }

        let kind = cr.remote_kind;
        let spec = cr.spec.clone();
        let name = self
            .behavior
            .remote_name
            .clone()
            .unwrap_or_else(|| reference.name().to_string());
        let arn = self.arn(kind, reference.name());
        let status = json!({
            "ackResourceMetadata": {
                "arn": arn,
                "ownerAccountID": self.behavior.account,
                "region": self.behavior.region,
            },
            "conditions": [
                { "type": "ACK.ResourceSynced", "status": "True" }
            ]
        });
        let tags = self.desired_tags(reference, &spec);

        self.remote.insert(
            arn.clone(),
            RemoteRecord {
                object: RemoteObject {
                    identifier: arn.clone(),
                    name: name.clone(),
                    configuration: configuration(kind, &arn, &name, &spec),
                },
                tags,
                pending: None,
                deleting: None,
            },
        );
        if let Some(cr) = self.resources.get_mut(reference) {
            cr.status = status;
        }
    }

    /// Advance lag counters for one remote read; `false` once the object is gone
    fn tick_remote(&mut self, identifier: &str) -> bool {
        let Some(record) = self.remote.get_mut(identifier) else {
            return false;
        };

        if let Some(left) = record.deleting {
            if left == 0 {
                self.remote.remove(identifier);
                return false;
            }
            record.deleting = Some(left - 1);
        }

        if let Some(pending) = record.pending.as_mut() {
            if pending.remaining == 0 {
                if let Some(pending) = record.pending.take() {
                    record.tags = pending.tags;
                    record.object.configuration = pending.configuration;
                }
            } else {
                pending.remaining -= 1;
            }
        }
        true
    }

    fn unreachable(&self) -> Option<RemoteError> {
        self.behavior
            .unreachable
            .then(|| RemoteError::Transport("connection reset by peer".to_string()))
    }
}

fn remote_kind_for(reference: &ResourceRef) -> RemoteKind {
    if reference.kind() == "StateMachine" {
        RemoteKind::StateMachine
    } else {
        RemoteKind::Activity
    }
}

/// Describe-style response for a remote object
fn configuration(kind: RemoteKind, arn: &str, name: &str, spec: &Value) -> Value {
    match kind {
        RemoteKind::Activity => json!({
            "activityArn": arn,
            "name": name,
        }),
        RemoteKind::StateMachine => json!({
            "stateMachineArn": arn,
            "name": name,
            "roleArn": spec.get("roleARN").cloned().unwrap_or(Value::Null),
            "definition": spec.get("definition").cloned().unwrap_or(Value::Null),
            "tracingConfiguration": {
                "enabled": spec
                    .pointer("/tracingConfiguration/enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            }
        }),
    }
}

#[async_trait]
impl ResourceClient for FakeControlPlane {
    async fn create(&self, desired: &DesiredResource) -> Result<ObservedResource, ClientError> {
        let mut state = self.state();
        state.calls.create += 1;

        if let Some(message) = state.behavior.fail_create.clone() {
            return Err(ClientError::Create(message));
        }

        let reference = desired.reference().clone();
        if state.resources.contains_key(&reference) {
            return Err(ClientError::AlreadyExists(format!(
                "{} '{}' already exists in namespace {}",
                reference.kind(),
                reference.name(),
                reference.namespace()
            )));
        }

        state.resources.insert(
            reference.clone(),
            CustomResource {
                remote_kind: remote_kind_for(&reference),
                spec: desired.spec().clone(),
                status: Value::Null,
                reads: 0,
            },
        );

        state
            .observed(&reference)
            .ok_or_else(|| ClientError::Create(format!("{reference} vanished")))
    }

    async fn get(&self, reference: &ResourceRef) -> Result<Option<ObservedResource>, ClientError> {
        let mut state = self.state();
        state.calls.get += 1;
        state.reconcile(reference);
        Ok(state.observed(reference))
    }

    async fn patch(
        &self,
        reference: &ResourceRef,
        patch: &Value,
    ) -> Result<ObservedResource, ClientError> {
        let mut state = self.state();
        state.calls.patch += 1;

        let converge_after = state.behavior.converge_after_reads;
        let Some(cr) = state.resources.get_mut(reference) else {
            return Err(ClientError::Patch(format!("{reference} not found")));
        };

        let mut doc = json!({ "spec": cr.spec });
        json_patch::merge(&mut doc, patch);
        cr.spec = doc.get("spec").cloned().unwrap_or(Value::Null);

        let kind = cr.remote_kind;
        let spec = cr.spec.clone();
        let arn = cr
            .status
            .pointer("/ackResourceMetadata/arn")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(arn) = arn {
            let tags = state.desired_tags(reference, &spec);
            if let Some(record) = state.remote.get_mut(&arn) {
                let configuration = configuration(kind, &arn, &record.object.name, &spec);
                record.pending = Some(Pending {
                    tags,
                    configuration,
                    remaining: converge_after,
                });
            }
        }

        state
            .observed(reference)
            .ok_or_else(|| ClientError::Patch(format!("{reference} not found")))
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<bool, ClientError> {
        let mut state = self.state();
        state.calls.delete += 1;

        if let Some(message) = state.behavior.fail_delete.clone() {
            return Err(ClientError::Delete(message));
        }

        let settle_after = state.behavior.settle_after_reads;
        let Some(cr) = state.resources.remove(reference) else {
            return Ok(false);
        };

        if let Some(arn) = cr.status.pointer("/ackResourceMetadata/arn").and_then(Value::as_str) {
            if let Some(record) = state.remote.get_mut(arn) {
                record.deleting = Some(settle_after);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl RemoteService for FakeControlPlane {
    async fn describe(
        &self,
        _kind: RemoteKind,
        identifier: &str,
    ) -> Result<RemoteObject, RemoteError> {
        let mut state = self.state();
        state.calls.describe += 1;

        if let Some(err) = state.unreachable() {
            return Err(err);
        }
        if !state.tick_remote(identifier) {
            return Err(RemoteError::NotFound(identifier.to_string()));
        }
        state
            .remote
            .get(identifier)
            .map(|record| record.object.clone())
            .ok_or_else(|| RemoteError::NotFound(identifier.to_string()))
    }

    async fn list_tags(&self, identifier: &str) -> Result<TagSet, RemoteError> {
        let mut state = self.state();
        state.calls.list_tags += 1;

        if let Some(err) = state.unreachable() {
            return Err(err);
        }
        if !state.tick_remote(identifier) {
            return Err(RemoteError::NotFound(identifier.to_string()));
        }
        state
            .remote
            .get(identifier)
            .map(|record| record.tags.clone())
            .ok_or_else(|| RemoteError::NotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfn;

    fn desired(fake: &FakeControlPlane) -> DesiredResource {
        sfn::activity_desired(&fake.harness(HarnessConfig::new())).unwrap()
    }

    #[tokio::test]
    async fn test_adopts_after_configured_reads() {
        let fake = FakeControlPlane::new();
        let desired = desired(&fake);
        let reference = desired.reference().clone();

        fake.create(&desired).await.unwrap();
        let first = fake.get(&reference).await.unwrap().unwrap();
        assert!(first.status.is_null());

        let second = fake.get(&reference).await.unwrap().unwrap();
        let arn = sfn::activity().identifier_of(&second).unwrap();
        assert!(arn.starts_with("arn:aws:states:us-west-2:000000000000:activity:"));
        assert!(second.is_synced());
        assert!(fake.remote_exists(&arn));
    }

    #[tokio::test]
    async fn test_remote_tags_include_system_tags() {
        let fake = FakeControlPlane::new();
        let desired = desired(&fake);
        let reference = desired.reference().clone();
        fake.create(&desired).await.unwrap();
        fake.get(&reference).await.unwrap();
        let observed = fake.get(&reference).await.unwrap().unwrap();
        let arn = sfn::activity().identifier_of(&observed).unwrap();

        let tags = fake.list_tags(&arn).await.unwrap();
        assert_eq!(tags.get("k1"), Some("v1"));
        assert_eq!(tags.get(CONTROLLER_VERSION_TAG), Some("sfn-v0.0.0"));
        assert_eq!(tags.get(NAMESPACE_TAG), Some("default"));
    }

    #[tokio::test]
    async fn test_patch_lags_by_configured_reads() {
        let fake = FakeControlPlane::new();
        let desired = desired(&fake);
        let reference = desired.reference().clone();
        fake.create(&desired).await.unwrap();
        fake.get(&reference).await.unwrap();
        let observed = fake.get(&reference).await.unwrap().unwrap();
        let arn = sfn::activity().identifier_of(&observed).unwrap();

        fake.patch(&reference, &json!({ "spec": { "tags": [{ "key": "k9", "value": "v9" }] } }))
            .await
            .unwrap();

        let before = fake.list_tags(&arn).await.unwrap();
        assert!(before.contains_key("k1"));
        let after = fake.list_tags(&arn).await.unwrap();
        assert!(!after.contains_key("k1"));
        assert_eq!(after.get("k9"), Some("v9"));
    }

    #[tokio::test]
    async fn test_delete_settles_after_configured_reads() {
        let fake = FakeControlPlane::new();
        let desired = desired(&fake);
        let reference = desired.reference().clone();
        fake.create(&desired).await.unwrap();
        fake.get(&reference).await.unwrap();
        let observed = fake.get(&reference).await.unwrap().unwrap();
        let arn = sfn::activity().identifier_of(&observed).unwrap();

        assert!(fake.delete(&reference).await.unwrap());
        assert!(!fake.delete(&reference).await.unwrap());

        assert!(fake.describe(RemoteKind::Activity, &arn).await.is_ok());
        assert!(matches!(
            fake.describe(RemoteKind::Activity, &arn).await,
            Err(RemoteError::NotFound(_))
        ));
        assert_eq!(fake.remote_count(), 0);
        assert_eq!(fake.calls().delete, 2);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let fake = FakeControlPlane::new();
        let desired = desired(&fake);

        fake.create(&desired).await.unwrap();
        let err = fake.create(&desired).await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_failing_delete_keeps_resource() {
        let fake = FakeControlPlane::with_behavior(FakeBehavior {
            fail_delete: Some("etcd unavailable".to_string()),
            ..FakeBehavior::default()
        });
        let desired = desired(&fake);
        let reference = desired.reference().clone();
        fake.create(&desired).await.unwrap();

        let err = fake.delete(&reference).await.unwrap_err();
        assert!(matches!(err, ClientError::Delete(ref m) if m == "etcd unavailable"));
        assert!(fake.resource_exists(&reference));
    }

    #[tokio::test]
    async fn test_unreachable_remote() {
        let fake = FakeControlPlane::with_behavior(FakeBehavior {
            unreachable: true,
            ..FakeBehavior::default()
        });
        let err = fake.describe(RemoteKind::Activity, "arn:x").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
