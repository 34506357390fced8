//! Remote service client
//!
//! The harness only ever reads from the remote service: describe an object by
//! identifier and list its tags. `RemoteService` is that narrow seam;
//! `AwsCliRemote` implements it by shelling out to the `aws` CLI the same way
//! cluster tooling is driven, so no SDK credentials plumbing lives here.

use crate::resource::RemoteKind;
use crate::tags::TagSet;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Errors from remote reads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("remote call failed: {0}")]
    Transport(String),

    #[error("malformed remote response: {0}")]
    Malformed(String),
}

/// A remote object as the service reports it
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    /// Opaque unique identifier (ARN)
    pub identifier: String,
    /// Object name
    pub name: String,
    /// Full describe response, for service-specific configuration
    pub configuration: Value,
}

impl RemoteObject {
    /// Look up a configuration field by JSON pointer
    #[must_use]
    pub fn field(&self, pointer: &str) -> Option<&Value> {
        self.configuration.pointer(pointer)
    }

    /// `tracingConfiguration.enabled`, false when absent
    #[must_use]
    pub fn tracing_enabled(&self) -> bool {
        self.field("/tracingConfiguration/enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Read-only access to the remote service
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Describe the object of family `kind` identified by `identifier`
    async fn describe(&self, kind: RemoteKind, identifier: &str)
        -> Result<RemoteObject, RemoteError>;

    /// List the tags attached to `identifier`
    async fn list_tags(&self, identifier: &str) -> Result<TagSet, RemoteError>;
}

/// `RemoteService` backed by the `aws stepfunctions` CLI
#[derive(Debug, Clone)]
pub struct AwsCliRemote {
    binary: String,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for AwsCliRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCliRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "aws".to_string(),
            region: None,
            profile: None,
        }
    }

    /// Pick up `AWS_REGION` / `AWS_PROFILE` if set
    #[must_use]
    pub fn from_env() -> Self {
        let mut remote = Self::new();
        remote.region = std::env::var("AWS_REGION").ok();
        remote.profile = std::env::var("AWS_PROFILE").ok();
        remote
    }

    /// Use a different CLI binary (e.g., a wrapper script)
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    fn args<'a>(&'a self, operation: &'a [&'a str]) -> Vec<&'a str> {
        let mut args = vec!["stepfunctions"];
        args.extend_from_slice(operation);
        args.extend_from_slice(&["--output", "json"]);
        if let Some(region) = &self.region {
            args.extend_from_slice(&["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            args.extend_from_slice(&["--profile", profile.as_str()]);
        }
        args
    }

    async fn run(&self, operation: &[&str]) -> Result<Value, RemoteError> {
        let args = self.args(operation);
        debug!(binary = %self.binary, args = ?args, "Running remote CLI");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| RemoteError::Transport(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RemoteService for AwsCliRemote {
    #[instrument(skip(self))]
    async fn describe(
        &self,
        kind: RemoteKind,
        identifier: &str,
    ) -> Result<RemoteObject, RemoteError> {
        let (operation, flag) = match kind {
            RemoteKind::Activity => ("describe-activity", "--activity-arn"),
            RemoteKind::StateMachine => ("describe-state-machine", "--state-machine-arn"),
        };
        let response = self.run(&[operation, flag, identifier]).await?;
        remote_object_from_describe(kind, response)
    }

    #[instrument(skip(self))]
    async fn list_tags(&self, identifier: &str) -> Result<TagSet, RemoteError> {
        let response = self
            .run(&["list-tags-for-resource", "--resource-arn", identifier])
            .await?;
        TagSet::from_json(response.get("tags").unwrap_or(&Value::Null))
            .map_err(|e| RemoteError::Malformed(format!("tags: {e}")))
    }
}

/// Map CLI stderr onto an error kind
fn classify_failure(stderr: &str) -> RemoteError {
    const NOT_FOUND_CODES: [&str; 3] = [
        "ActivityDoesNotExist",
        "StateMachineDoesNotExist",
        "ResourceNotFound",
    ];

    let message = stderr.trim().to_string();
    if NOT_FOUND_CODES.iter().any(|code| stderr.contains(code)) {
        RemoteError::NotFound(message)
    } else {
        RemoteError::Transport(message)
    }
}

/// Build a `RemoteObject` from a describe-activity / describe-state-machine response
pub(crate) fn remote_object_from_describe(
    kind: RemoteKind,
    response: Value,
) -> Result<RemoteObject, RemoteError> {
    let arn_field = match kind {
        RemoteKind::Activity => "activityArn",
        RemoteKind::StateMachine => "stateMachineArn",
    };

    let identifier = response
        .get(arn_field)
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed(format!("missing {arn_field}")))?
        .to_string();
    let name = response
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Malformed("missing name".to_string()))?
        .to_string();

    Ok(RemoteObject {
        identifier,
        name,
        configuration: response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_not_found() {
        let err = classify_failure(
            "An error occurred (ActivityDoesNotExist) when calling the DescribeActivity operation",
        );
        assert!(matches!(err, RemoteError::NotFound(_)));

        let err = classify_failure("An error occurred (StateMachineDoesNotExist)");
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn test_classify_transport() {
        let err = classify_failure("Unable to locate credentials\n");
        assert_eq!(
            err,
            RemoteError::Transport("Unable to locate credentials".to_string())
        );
    }

    #[test]
    fn test_describe_state_machine_response() {
        let obj = remote_object_from_describe(
            RemoteKind::StateMachine,
            json!({
                "stateMachineArn": "arn:aws:states:us-west-2:1:stateMachine:sm",
                "name": "sm",
                "tracingConfiguration": { "enabled": true }
            }),
        )
        .unwrap();

        assert_eq!(obj.name, "sm");
        assert!(obj.tracing_enabled());
        assert_eq!(obj.field("/name"), Some(&json!("sm")));
    }

    #[test]
    fn test_describe_activity_response_missing_arn() {
        let err = remote_object_from_describe(RemoteKind::Activity, json!({ "name": "a" }))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(m) if m.contains("activityArn")));
    }

    #[test]
    fn test_tracing_defaults_to_disabled() {
        let obj = RemoteObject {
            identifier: "arn".to_string(),
            name: "a".to_string(),
            configuration: json!({}),
        };
        assert!(!obj.tracing_enabled());
    }

    #[test]
    fn test_cli_args_include_region_and_profile() {
        let remote = AwsCliRemote::new().region("us-west-2").profile("e2e");
        let args = remote.args(&["list-tags-for-resource", "--resource-arn", "arn"]);
        assert_eq!(
            args,
            vec![
                "stepfunctions",
                "list-tags-for-resource",
                "--resource-arn",
                "arn",
                "--output",
                "json",
                "--region",
                "us-west-2",
                "--profile",
                "e2e"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let remote = AwsCliRemote::new().binary("nonexistent_aws_cli_xyz");
        let err = remote.list_tags("arn").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
