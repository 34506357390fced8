//! Step Functions resource kinds
//!
//! The two CRDs the controller reconciles, the placeholder tokens their
//! templates use, and builders for uniquely named desired resources.

use crate::harness::{Harness, HarnessError};
use crate::resource::{random_suffix_name, DesiredResource, RemoteKind, ResourceKind};
use crate::tags::TagSet;
use crate::template::Replacements;

/// Service marker name
pub const SERVICE: &str = "sfn";
pub const GROUP: &str = "sfn.services.k8s.aws";
pub const VERSION: &str = "v1alpha1";

pub const ACTIVITY_NAME_TOKEN: &str = "ACTIVITY_NAME";
pub const STATE_MACHINE_NAME_TOKEN: &str = "STATE_MACHINE_NAME";
pub const EXECUTION_ROLE_TOKEN: &str = "SFN_EXECUTION_ROLE_ARN";

/// Generated names are at most this long
pub const NAME_LENGTH: usize = 24;

#[must_use]
pub fn activity() -> ResourceKind {
    ResourceKind::new(GROUP, VERSION, "Activity", "activities").remote(RemoteKind::Activity)
}

#[must_use]
pub fn state_machine() -> ResourceKind {
    ResourceKind::new(GROUP, VERSION, "StateMachine", "statemachines")
        .remote(RemoteKind::StateMachine)
}

/// A fresh `sfn-activity-<suffix>` from `activity.yaml`
pub fn activity_desired(harness: &Harness) -> Result<DesiredResource, HarnessError> {
    let name = random_suffix_name("sfn-activity", NAME_LENGTH);
    let replacements = Replacements::new().with(ACTIVITY_NAME_TOKEN, &name);
    harness.desired(&activity(), &name, "activity", &replacements)
}

/// A fresh `sfn-statemachine-<suffix>` from `state_machine.yaml`
///
/// Needs the bootstrap execution role.
pub fn state_machine_desired(harness: &Harness) -> Result<DesiredResource, HarnessError> {
    let role = harness.bootstrap().sfn_execution_role_arn()?;
    let name = random_suffix_name("sfn-statemachine", NAME_LENGTH);
    let replacements = Replacements::new()
        .with(STATE_MACHINE_NAME_TOKEN, &name)
        .with(EXECUTION_ROLE_TOKEN, role);
    harness.desired(&state_machine(), &name, "state_machine", &replacements)
}

/// Tags the bundled templates declare
#[must_use]
pub fn initial_tags() -> TagSet {
    TagSet::from_pairs([("k1", "v1"), ("k2", "v2"), ("k3", "v3")])
}

/// Tags the update scenarios switch to: one changed, two added, two removed
#[must_use]
pub fn updated_tags() -> TagSet {
    TagSet::from_pairs([("k3", "v3-new"), ("k4", "v4"), ("k5", "v5")])
}
