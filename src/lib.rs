//! sfn-e2e - lifecycle verification for the Step Functions controller
//!
//! Drives Activity and StateMachine custom resources through their whole
//! life against a live cluster and account, checking that the controller
//! reflects every change in the remote service:
//!
//! - create a CR and wait for the controller to record the remote ARN
//! - confirm the remote object exists under the expected name
//! - patch tags or configuration and wait for the remote side to follow
//! - delete the CR and wait for the remote object to disappear
//!
//! Every fixture tears itself down, including when the test body fails.
//!
//! # Example
//!
//! ```ignore
//! use sfn_e2e::{sfn, BoxError, Harness};
//!
//! #[sfn_e2e::test(service = "sfn")]
//! async fn test_activity_tags(harness: Harness) -> Result<(), BoxError> {
//!     let desired = sfn::activity_desired(&harness)?;
//!     harness
//!         .lifecycle(sfn::activity(), desired)
//!         .run(|mut activity| async move {
//!             activity.set_tags(&sfn::updated_tags()).await?;
//!             activity.wait_for_tags(&sfn::updated_tags()).await?;
//!             Ok(())
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! Live tests only run when `E2E_SERVICES` selects their service:
//!
//! ```bash
//! E2E_SERVICES=sfn SFN_EXECUTION_ROLE_ARN=arn:aws:iam::...:role/sfn cargo test
//! ```

pub mod bootstrap;
pub mod config;
pub mod eventually;
pub mod fake;
pub mod harness;
pub mod kube_client;
pub mod lifecycle;
pub mod marker;
pub mod probe;
pub mod remote;
pub mod resource;
pub mod sfn;
pub mod tags;
pub mod telemetry;
pub mod template;
pub mod wait;

// Re-export the test macro
pub use sfn_e2e_macros::test;

// Re-export commonly used types
pub use bootstrap::{BootstrapError, BootstrapResources};
pub use config::{ConfigError, HarnessConfig, WaitPolicy};
pub use eventually::{eventually, poll, Eventually, WaitOutcome};
pub use harness::{Harness, HarnessError};
pub use kube_client::{ClientError, KubeResourceClient, ResourceClient};
pub use lifecycle::{
    BoxError, Lifecycle, LifecycleError, LifecycleState, Resource, TeardownOutcome,
};
pub use probe::{Probe, ProbeOutcome};
pub use remote::{AwsCliRemote, RemoteError, RemoteObject, RemoteService};
pub use resource::{
    random_suffix_name, DesiredResource, ObservedResource, RemoteKind, ResourceKind, ResourceRef,
};
pub use tags::{
    check_system_tag_provenance, compute_tags_delta, equal_modulo_system_tags, equal_tags,
    has_system_tags, SystemTagPolicy, Tag, TagDelta, TagSet,
};
pub use telemetry::init_logging;
pub use template::{Replacements, TemplateError, TemplateLoader};
pub use wait::WaitTimeout;
