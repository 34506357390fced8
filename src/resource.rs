//! Resource descriptors for custom resources under test
//!
//! A `ResourceKind` describes one CRD the controller reconciles: where it
//! lives in the API, where the controller writes the remote identifier, and
//! which remote describe operation answers for it. Everything else in the
//! harness is written once against this descriptor.
//!
//! # Example
//!
//! ```
//! use sfn_e2e::resource::{random_suffix_name, ResourceKind, RemoteKind};
//!
//! let kind = ResourceKind::new("sfn.services.k8s.aws", "v1alpha1", "Activity", "activities")
//!     .remote(RemoteKind::Activity);
//! let name = random_suffix_name("sfn-activity", 24);
//! let reference = kind.reference(&name, "default");
//!
//! assert_eq!(reference.plural(), "activities");
//! assert_eq!(name.len(), 24);
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Where ACK-style controllers record the remote identifier
pub const DEFAULT_IDENTIFIER_POINTER: &str = "/status/ackResourceMetadata/arn";

/// Condition type set once the controller has synced spec to the remote side
pub const CONDITION_SYNCED: &str = "ACK.ResourceSynced";

/// Condition type set when the controller gave up on the resource
pub const CONDITION_TERMINAL: &str = "ACK.Terminal";

/// Remote object family a kind maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKind {
    Activity,
    StateMachine,
}

impl RemoteKind {
    /// Segment used in remote identifiers (`arn:...:activity:name`)
    #[must_use]
    pub fn arn_segment(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::StateMachine => "stateMachine",
        }
    }
}

/// Descriptor for a custom resource kind managed by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// API group (e.g., "sfn.services.k8s.aws")
    pub group: String,
    /// API version (e.g., "v1alpha1")
    pub version: String,
    /// Kind name (singular, e.g., "Activity")
    pub kind: String,
    /// Resource plural (e.g., "activities")
    pub plural: String,
    /// JSON pointer to the remote identifier inside the CR
    pub identifier_pointer: String,
    /// Which remote describe operation answers for this kind
    pub remote: RemoteKind,
}

impl ResourceKind {
    /// Create a descriptor with the default identifier location
    #[must_use]
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            identifier_pointer: DEFAULT_IDENTIFIER_POINTER.to_string(),
            remote: RemoteKind::Activity,
        }
    }

    /// Set the remote object family
    #[must_use]
    pub fn remote(mut self, remote: RemoteKind) -> Self {
        self.remote = remote;
        self
    }

    /// Override where the controller writes the remote identifier
    #[must_use]
    pub fn identifier_pointer(mut self, pointer: &str) -> Self {
        self.identifier_pointer = pointer.to_string();
        self
    }

    /// `group/version`, or just `version` for the core group
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Build the identity key for one instance of this kind
    #[must_use]
    pub fn reference(&self, name: &str, namespace: &str) -> ResourceRef {
        ResourceRef {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Read the remote identifier the controller wrote into `observed`
    #[must_use]
    pub fn identifier_of(&self, observed: &ObservedResource) -> Option<String> {
        observed.identifier_at(&self.identifier_pointer)
    }
}

/// Identity key for all Kubernetes-side operations
///
/// Fields are private so a reference cannot change once handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    group: String,
    version: String,
    kind: String,
    plural: String,
    name: String,
    namespace: String,
}

impl ResourceRef {
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn plural(&self) -> &str {
        &self.plural
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Convert to kube `ApiResource`
    pub(crate) fn to_api_resource(&self) -> kube::core::ApiResource {
        kube::core::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.plural, self.namespace, self.name)
    }
}

/// A resource ready to be submitted: identity plus the rendered document
#[derive(Debug, Clone)]
pub struct DesiredResource {
    reference: ResourceRef,
    payload: Value,
}

impl DesiredResource {
    /// Pair a reference with a rendered payload
    ///
    /// `metadata.name` and `metadata.namespace` in the payload are forced to
    /// match the reference so the two can never disagree.
    #[must_use]
    pub fn new(reference: ResourceRef, mut payload: Value) -> Self {
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("apiVersion")
                .or_insert_with(|| Value::String(reference.api_version()));
            obj.entry("kind")
                .or_insert_with(|| Value::String(reference.kind().to_string()));
            let metadata = obj
                .entry("metadata")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(meta) = metadata.as_object_mut() {
                meta.insert("name".into(), Value::String(reference.name().to_string()));
                meta.insert(
                    "namespace".into(),
                    Value::String(reference.namespace().to_string()),
                );
            }
        }
        Self { reference, payload }
    }

    #[must_use]
    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    /// Resource name, also the expected remote object name
    #[must_use]
    pub fn name(&self) -> &str {
        self.reference.name()
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The declared `spec` section (or `null`)
    #[must_use]
    pub fn spec(&self) -> &Value {
        self.payload.get("spec").unwrap_or(&Value::Null)
    }
}

/// A status condition written by the controller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Snapshot of a CR as last read from the API server
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResource {
    pub reference: ResourceRef,
    /// `spec` as last written
    pub spec: Value,
    /// Controller-populated status (`null` until the controller writes it)
    pub status: Value,
}

impl ObservedResource {
    #[must_use]
    pub fn new(reference: ResourceRef, spec: Value, status: Value) -> Self {
        Self {
            reference,
            spec,
            status,
        }
    }

    /// Read a non-empty string at a JSON pointer rooted at the whole object
    #[must_use]
    pub fn identifier_at(&self, pointer: &str) -> Option<String> {
        let doc = serde_json::json!({ "spec": self.spec, "status": self.status });
        doc.pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Parsed `status.conditions`, skipping entries that don't parse
    #[must_use]
    pub fn conditions(&self) -> Vec<Condition> {
        self.status
            .get("conditions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<Condition> {
        self.conditions().into_iter().find(|c| c.type_ == type_)
    }

    /// Whether the controller reports the remote side in sync with spec
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.condition(CONDITION_SYNCED)
            .is_some_and(|c| c.is_true())
    }

    /// Message of a true `ACK.Terminal` condition, if any
    #[must_use]
    pub fn terminal_message(&self) -> Option<String> {
        self.condition(CONDITION_TERMINAL)
            .filter(Condition::is_true)
            .map(|c| c.message.unwrap_or_else(|| "no message".to_string()))
    }

    /// Short human-readable summary for timeout diagnostics
    #[must_use]
    pub fn state_description(&self) -> String {
        if self.status.is_null() {
            return "no status written".to_string();
        }
        if let Some(msg) = self.terminal_message() {
            return format!("terminal: {msg}");
        }
        let conditions = self.conditions();
        if conditions.is_empty() {
            return "status written, no conditions".to_string();
        }
        conditions
            .iter()
            .map(|c| format!("{}={}", c.type_, c.status))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Append a random suffix so names don't collide across parallel runs
///
/// Mirrors the usual `<prefix>-<random>` convention: the result is exactly
/// `max_len` characters when the prefix leaves room, with at least 6 random
/// characters otherwise.
#[must_use]
pub fn random_suffix_name(prefix: &str, max_len: usize) -> String {
    const MIN_SUFFIX: usize = 6;

    let room = max_len.saturating_sub(prefix.len() + 1).max(MIN_SUFFIX);
    let mut suffix = String::with_capacity(room);
    while suffix.len() < room {
        suffix.push_str(&uuid::Uuid::new_v4().simple().to_string());
    }
    suffix.truncate(room);

    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity() -> ResourceKind {
        ResourceKind::new("sfn.services.k8s.aws", "v1alpha1", "Activity", "activities")
    }

    #[test]
    fn test_reference_carries_kind_identity() {
        let r = activity().reference("sfn-activity-abc", "default");
        assert_eq!(r.group(), "sfn.services.k8s.aws");
        assert_eq!(r.api_version(), "sfn.services.k8s.aws/v1alpha1");
        assert_eq!(r.kind(), "Activity");
        assert_eq!(r.to_string(), "activities/default/sfn-activity-abc");
    }

    #[test]
    fn test_api_resource_core_group() {
        let kind = ResourceKind::new("", "v1", "ConfigMap", "configmaps");
        let ar = kind.reference("x", "default").to_api_resource();
        assert_eq!(ar.api_version, "v1");
        assert_eq!(ar.plural, "configmaps");
    }

    #[test]
    fn test_desired_resource_forces_metadata() {
        let r = activity().reference("mine", "team-a");
        let desired = DesiredResource::new(
            r,
            json!({ "metadata": { "name": "other" }, "spec": { "name": "mine" } }),
        );
        assert_eq!(desired.payload()["metadata"]["name"], "mine");
        assert_eq!(desired.payload()["metadata"]["namespace"], "team-a");
        assert_eq!(desired.payload()["kind"], "Activity");
        assert_eq!(desired.spec()["name"], "mine");
    }

    #[test]
    fn test_identifier_requires_non_empty_value() {
        let r = activity().reference("a", "default");
        let kind = activity();

        let empty = ObservedResource::new(
            r.clone(),
            json!({}),
            json!({ "ackResourceMetadata": { "arn": "" } }),
        );
        assert_eq!(kind.identifier_of(&empty), None);

        let adopted = ObservedResource::new(
            r,
            json!({}),
            json!({ "ackResourceMetadata": { "arn": "arn:aws:states:us-west-2:1:activity:a" } }),
        );
        assert_eq!(
            kind.identifier_of(&adopted).as_deref(),
            Some("arn:aws:states:us-west-2:1:activity:a")
        );
    }

    #[test]
    fn test_conditions_and_sync_state() {
        let r = activity().reference("a", "default");
        let observed = ObservedResource::new(
            r,
            json!({}),
            json!({ "conditions": [
                { "type": "ACK.ResourceSynced", "status": "True" },
                { "type": "ACK.Terminal", "status": "True", "message": "bad role" },
                { "bogus": true }
            ]}),
        );
        assert_eq!(observed.conditions().len(), 2);
        assert!(observed.is_synced());
        assert_eq!(observed.terminal_message().as_deref(), Some("bad role"));
        assert_eq!(observed.state_description(), "terminal: bad role");
    }

    #[test]
    fn test_state_description_without_status() {
        let r = activity().reference("a", "default");
        let observed = ObservedResource::new(r, json!({}), Value::Null);
        assert_eq!(observed.state_description(), "no status written");
        assert!(!observed.is_synced());
    }

    #[test]
    fn test_random_suffix_name_length_and_prefix() {
        let name = random_suffix_name("sfn-activity", 24);
        assert_eq!(name.len(), 24);
        assert!(name.starts_with("sfn-activity-"));
        assert!(name[13..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_suffix_name_keeps_minimum_entropy() {
        let name = random_suffix_name("a-very-long-prefix-for-names", 10);
        assert_eq!(name.len(), "a-very-long-prefix-for-names".len() + 1 + 6);
    }

    #[test]
    fn test_random_suffix_names_differ() {
        let a = random_suffix_name("sfn-statemachine", 24);
        let b = random_suffix_name("sfn-statemachine", 24);
        assert_ne!(a, b);
    }
}
