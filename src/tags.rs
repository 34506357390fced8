//! Tag set comparison modulo controller-injected system tags
//!
//! The controller stamps every remote object with bookkeeping tags under a
//! reserved key prefix. Comparisons between what a CR declares and what the
//! remote side reports must ignore those, while a separate check makes sure
//! they are actually there.
//!
//! # Example
//!
//! ```
//! use sfn_e2e::tags::{equal_modulo_system_tags, has_system_tags, SystemTagPolicy, TagSet};
//!
//! let policy = SystemTagPolicy::default();
//! let desired = TagSet::from_pairs([("k1", "v1")]);
//! let observed = TagSet::from_pairs([
//!     ("k1", "v1"),
//!     ("services.k8s.aws/controller-version", "sfn-v1.0.0"),
//!     ("services.k8s.aws/namespace", "default"),
//! ]);
//!
//! assert!(equal_modulo_system_tags(&desired, &observed, &policy));
//! assert!(has_system_tags(&observed, &policy));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved key prefix for controller-injected tags
pub const SYSTEM_TAG_PREFIX: &str = "services.k8s.aws/";

/// Controller version tag, valued `<service>-<version>`
pub const CONTROLLER_VERSION_TAG: &str = "services.k8s.aws/controller-version";

/// Namespace of the CR that owns the remote object
pub const NAMESPACE_TAG: &str = "services.k8s.aws/namespace";

/// A single key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered tag sequence; keys are expected to be unique
///
/// Duplicate keys are a caller error and make comparisons meaningless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }

    /// Parse a `[{key, value}]` JSON array; `null` is an empty set
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::new());
        }
        serde_json::from_value(value.clone())
    }

    /// Render as the `[{key, value}]` JSON array CR specs use
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|t| serde_json::json!({ "key": t.key, "value": t.value }))
                .collect(),
        )
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push(Tag::new(key, value));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|t| t.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this set with every system-prefixed pair removed
    #[must_use]
    pub fn without_system(&self, policy: &SystemTagPolicy) -> Self {
        Self(
            self.0
                .iter()
                .filter(|t| !policy.is_system_key(&t.key))
                .cloned()
                .collect(),
        )
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for TagSet {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Which keys the controller owns and which of them must be present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTagPolicy {
    /// Reserved key prefix
    pub prefix: String,
    /// Keys that must all appear on every managed remote object
    pub required_keys: Vec<String>,
}

impl Default for SystemTagPolicy {
    fn default() -> Self {
        Self {
            prefix: SYSTEM_TAG_PREFIX.to_string(),
            required_keys: vec![
                CONTROLLER_VERSION_TAG.to_string(),
                NAMESPACE_TAG.to_string(),
            ],
        }
    }
}

impl SystemTagPolicy {
    #[must_use]
    pub fn is_system_key(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }
}

/// Whether `observed` equals `desired` once system-prefixed pairs are dropped
///
/// Every pair in `desired` must be in `observed` with the same value, and every
/// non-system pair in `observed` must be in `desired` with the same value.
#[must_use]
pub fn equal_modulo_system_tags(
    desired: &TagSet,
    observed: &TagSet,
    policy: &SystemTagPolicy,
) -> bool {
    let desired_present = desired
        .iter()
        .all(|t| observed.get(&t.key) == Some(t.value.as_str()));

    let observed_declared = observed
        .iter()
        .filter(|t| !policy.is_system_key(&t.key))
        .all(|t| desired.get(&t.key) == Some(t.value.as_str()));

    desired_present && observed_declared
}

/// Whether every required system key is present in `observed`
#[must_use]
pub fn has_system_tags(observed: &TagSet, policy: &SystemTagPolicy) -> bool {
    policy
        .required_keys
        .iter()
        .all(|key| observed.contains_key(key))
}

/// A system tag that is missing or carries the wrong provenance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvenanceError {
    #[error("system tag {0} is missing")]
    Missing(String),

    #[error("system tag {key} has value '{actual}', expected {expected}")]
    WrongValue {
        key: String,
        actual: String,
        expected: String,
    },
}

/// Check system tags are present and point back at this controller and namespace
///
/// The controller version tag must start with `<service>-` and the namespace
/// tag must equal the CR namespace.
pub fn check_system_tag_provenance(
    observed: &TagSet,
    policy: &SystemTagPolicy,
    service: &str,
    namespace: &str,
) -> Result<(), ProvenanceError> {
    if let Some(missing) = policy
        .required_keys
        .iter()
        .find(|key| !observed.contains_key(key))
    {
        return Err(ProvenanceError::Missing(missing.clone()));
    }

    if let Some(version) = observed.get(CONTROLLER_VERSION_TAG) {
        let expected_prefix = format!("{service}-");
        if !version.starts_with(&expected_prefix) {
            return Err(ProvenanceError::WrongValue {
                key: CONTROLLER_VERSION_TAG.to_string(),
                actual: version.to_string(),
                expected: format!("a value starting with '{expected_prefix}'"),
            });
        }
    }

    if let Some(ns) = observed.get(NAMESPACE_TAG) {
        if ns != namespace {
            return Err(ProvenanceError::WrongValue {
                key: NAMESPACE_TAG.to_string(),
                actual: ns.to_string(),
                expected: format!("'{namespace}'"),
            });
        }
    }

    Ok(())
}

/// What it takes to turn one tag set into another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Pairs from the target set that are new or changed
    pub added_or_updated: Vec<Tag>,
    /// Keys of the source set absent from the target
    pub removed: Vec<String>,
}

impl TagDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_or_updated.is_empty() && self.removed.is_empty()
    }
}

/// Compute the changes that turn `latest` into `desired`
#[must_use]
pub fn compute_tags_delta(latest: &TagSet, desired: &TagSet) -> TagDelta {
    let mut delta = TagDelta::default();

    for tag in latest.iter() {
        match desired.get(&tag.key) {
            Some(value) if value != tag.value => {
                delta.added_or_updated.push(Tag::new(&tag.key, value));
            }
            Some(_) => {}
            None => delta.removed.push(tag.key.clone()),
        }
    }

    delta.added_or_updated.extend(
        desired
            .iter()
            .filter(|t| !latest.contains_key(&t.key))
            .cloned(),
    );

    delta
}

/// Order-insensitive equality
#[must_use]
pub fn equal_tags(a: &TagSet, b: &TagSet) -> bool {
    compute_tags_delta(a, b).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn system_tags() -> TagSet {
        TagSet::from_pairs([
            (CONTROLLER_VERSION_TAG, "sfn-v1.2.0"),
            (NAMESPACE_TAG, "default"),
        ])
    }

    fn union(a: &TagSet, b: &TagSet) -> TagSet {
        a.iter().chain(b.iter()).cloned().collect()
    }

    #[test]
    fn test_equal_when_observed_is_desired_plus_system() {
        let policy = SystemTagPolicy::default();
        let desired = TagSet::from_pairs([("k1", "v1"), ("k2", "v2"), ("k3", "v3")]);
        let observed = union(&system_tags(), &desired);
        assert!(equal_modulo_system_tags(&desired, &observed, &policy));
    }

    #[test]
    fn test_empty_desired_against_only_system_tags() {
        let policy = SystemTagPolicy::default();
        assert!(equal_modulo_system_tags(
            &TagSet::new(),
            &system_tags(),
            &policy
        ));
    }

    #[test]
    fn test_extra_user_tag_in_observed_is_unequal() {
        let policy = SystemTagPolicy::default();
        let desired = TagSet::from_pairs([("k3", "v3-new")]);
        let observed = union(&system_tags(), &desired).with("k1", "v1");
        assert!(!equal_modulo_system_tags(&desired, &observed, &policy));
    }

    #[test]
    fn test_changed_value_is_unequal() {
        let policy = SystemTagPolicy::default();
        let desired = TagSet::from_pairs([("k3", "v3-new")]);
        let observed = union(&system_tags(), &TagSet::from_pairs([("k3", "v3")]));
        assert!(!equal_modulo_system_tags(&desired, &observed, &policy));
    }

    #[test]
    fn test_missing_desired_tag_is_unequal() {
        let policy = SystemTagPolicy::default();
        let desired = TagSet::from_pairs([("k4", "v4"), ("k5", "v5")]);
        let observed = union(&system_tags(), &TagSet::from_pairs([("k4", "v4")]));
        assert!(!equal_modulo_system_tags(&desired, &observed, &policy));
    }

    #[test]
    fn test_order_does_not_matter() {
        let policy = SystemTagPolicy::default();
        let desired = TagSet::from_pairs([("a", "1"), ("b", "2")]);
        let observed = TagSet::from_pairs([("b", "2"), (NAMESPACE_TAG, "default"), ("a", "1")]);
        assert!(equal_modulo_system_tags(&desired, &observed, &policy));
    }

    #[test]
    fn test_has_system_tags() {
        let policy = SystemTagPolicy::default();
        assert!(has_system_tags(&system_tags(), &policy));
        assert!(!has_system_tags(
            &TagSet::from_pairs([(NAMESPACE_TAG, "default")]),
            &policy
        ));
        assert!(!has_system_tags(&TagSet::new(), &policy));
    }

    #[test]
    fn test_custom_prefix_policy() {
        let policy = SystemTagPolicy {
            prefix: "aws:".to_string(),
            required_keys: vec![],
        };
        let desired = TagSet::new();
        let observed = TagSet::from_pairs([("aws:cloudformation:stack-name", "x")]);
        assert!(equal_modulo_system_tags(&desired, &observed, &policy));
        assert!(has_system_tags(&observed, &policy));
    }

    #[test]
    fn test_provenance_accepts_matching_values() {
        let policy = SystemTagPolicy::default();
        assert_eq!(
            check_system_tag_provenance(&system_tags(), &policy, "sfn", "default"),
            Ok(())
        );
    }

    #[test]
    fn test_provenance_rejects_foreign_controller_and_namespace() {
        let policy = SystemTagPolicy::default();

        let err = check_system_tag_provenance(&system_tags(), &policy, "s3", "default")
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::WrongValue { ref key, .. } if key == CONTROLLER_VERSION_TAG));

        let err = check_system_tag_provenance(&system_tags(), &policy, "sfn", "other")
            .unwrap_err();
        assert!(err.to_string().contains("'other'"));

        let err = check_system_tag_provenance(&TagSet::new(), &policy, "sfn", "default")
            .unwrap_err();
        assert_eq!(err, ProvenanceError::Missing(CONTROLLER_VERSION_TAG.to_string()));
    }

    #[test]
    fn test_compute_tags_delta() {
        let latest = TagSet::from_pairs([("k1", "v1"), ("k2", "v2"), ("k3", "v3")]);
        let desired = TagSet::from_pairs([("k3", "v3-new"), ("k4", "v4"), ("k5", "v5")]);

        let delta = compute_tags_delta(&latest, &desired);
        assert_eq!(delta.removed, vec!["k1".to_string(), "k2".to_string()]);
        assert_eq!(
            delta.added_or_updated,
            vec![
                Tag::new("k3", "v3-new"),
                Tag::new("k4", "v4"),
                Tag::new("k5", "v5")
            ]
        );
        assert!(!equal_tags(&latest, &desired));
    }

    #[test]
    fn test_equal_tags_ignores_order() {
        let a = TagSet::from_pairs([("x", "1"), ("y", "2")]);
        let b = TagSet::from_pairs([("y", "2"), ("x", "1")]);
        assert!(equal_tags(&a, &b));
    }

    #[test]
    fn test_json_conversion() {
        let tags = TagSet::from_json(&json!([{ "key": "k1", "value": "v1" }, { "key": "k2" }]))
            .unwrap();
        assert_eq!(tags.get("k1"), Some("v1"));
        assert_eq!(tags.get("k2"), Some(""));
        assert_eq!(tags.to_json()[0]["key"], "k1");
        assert!(TagSet::from_json(&Value::Null).unwrap().is_empty());
        assert!(TagSet::from_json(&json!("nope")).is_err());
    }

    #[test]
    fn test_without_system() {
        let policy = SystemTagPolicy::default();
        let all = union(&system_tags(), &TagSet::from_pairs([("k", "v")]));
        assert_eq!(all.without_system(&policy), TagSet::from_pairs([("k", "v")]));
    }
}
