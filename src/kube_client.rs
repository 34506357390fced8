//! Kubernetes resource client
//!
//! `ResourceClient` is the narrow set of CR operations the lifecycle engine
//! needs. `KubeResourceClient` implements it with the dynamic client, so any
//! CRD described by a `ResourceKind` works without generated types.
//!
//! Every call goes to the API server; nothing is cached.

use crate::resource::{DesiredResource, ObservedResource, ResourceRef};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::Value;
use tracing::{debug, info};

/// Errors from Kubernetes operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to create Kubernetes client: {0}")]
    Connect(String),

    #[error("Failed to create resource: {0}")]
    Create(String),

    /// Create was rejected because a resource with that name already exists
    #[error("Failed to create resource: {0}")]
    AlreadyExists(String),

    #[error("Failed to get resource: {0}")]
    Get(String),

    #[error("Failed to patch resource: {0}")]
    Patch(String),

    #[error("Failed to delete resource: {0}")]
    Delete(String),

    #[error("Invalid resource document: {0}")]
    InvalidObject(String),
}

/// CR operations used by the lifecycle engine
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Submit a new CR
    async fn create(&self, desired: &DesiredResource) -> Result<ObservedResource, ClientError>;

    /// Read a CR; `Ok(None)` when it does not exist
    async fn get(&self, reference: &ResourceRef) -> Result<Option<ObservedResource>, ClientError>;

    /// JSON merge patch a CR and return the server's view afterwards
    async fn patch(
        &self,
        reference: &ResourceRef,
        patch: &Value,
    ) -> Result<ObservedResource, ClientError>;

    /// Delete a CR; `Ok(false)` when it was already gone
    async fn delete(&self, reference: &ResourceRef) -> Result<bool, ClientError>;
}

/// `ResourceClient` over a live cluster
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the default kubeconfig / in-cluster config
    pub async fn try_default() -> Result<Self, ClientError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn api(&self, reference: &ResourceRef) -> Api<DynamicObject> {
        let ar = reference.to_api_resource();
        Api::namespaced_with(self.client.clone(), reference.namespace(), &ar)
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn create(&self, desired: &DesiredResource) -> Result<ObservedResource, ClientError> {
        let reference = desired.reference();
        let obj: DynamicObject = serde_json::from_value(desired.payload().clone())
            .map_err(|e| ClientError::InvalidObject(e.to_string()))?;

        let created = match self.api(reference).create(&PostParams::default(), &obj).await {
            Ok(created) => created,
            Err(e) => return Err(create_error(&e, reference)),
        };

        info!(resource = %reference, "Created custom resource");
        Ok(observed_from(reference, created))
    }

    async fn get(&self, reference: &ResourceRef) -> Result<Option<ObservedResource>, ClientError> {
        let found = self
            .api(reference)
            .get_opt(reference.name())
            .await
            .map_err(|e| ClientError::Get(improve_error_message(&e, reference)))?;

        Ok(found.map(|obj| observed_from(reference, obj)))
    }

    async fn patch(
        &self,
        reference: &ResourceRef,
        patch: &Value,
    ) -> Result<ObservedResource, ClientError> {
        let patched = self
            .api(reference)
            .patch(reference.name(), &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| ClientError::Patch(improve_error_message(&e, reference)))?;

        info!(resource = %reference, "Patched custom resource");
        Ok(observed_from(reference, patched))
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<bool, ClientError> {
        match self
            .api(reference)
            .delete(reference.name(), &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(resource = %reference, "Deleted custom resource");
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(resource = %reference, "Custom resource already gone");
                Ok(false)
            }
            Err(e) => Err(ClientError::Delete(improve_error_message(&e, reference))),
        }
    }
}

fn observed_from(reference: &ResourceRef, obj: DynamicObject) -> ObservedResource {
    let spec = obj.data.get("spec").cloned().unwrap_or(Value::Null);
    let status = obj.data.get("status").cloned().unwrap_or(Value::Null);
    ObservedResource::new(reference.clone(), spec, status)
}

fn create_error(err: &kube::Error, reference: &ResourceRef) -> ClientError {
    let message = improve_error_message(err, reference);
    match err {
        kube::Error::Api(ae) if ae.code == 409 => ClientError::AlreadyExists(message),
        _ => ClientError::Create(message),
    }
}

/// Improve a kube error message with human-readable context
fn improve_error_message(err: &kube::Error, reference: &ResourceRef) -> String {
    describe_failure(&err.to_string(), reference)
}

fn describe_failure(raw: &str, reference: &ResourceRef) -> String {
    let what = format!("{} '{}'", reference.kind(), reference.name());
    let ns = reference.namespace();

    if raw.contains("NotFound") || raw.contains("404") {
        return format!("{what} not found in namespace {ns} (is the CRD installed?)");
    }

    if raw.contains("AlreadyExists") || raw.contains("409") {
        return format!("{what} already exists in namespace {ns}");
    }

    if raw.contains("Forbidden") || raw.contains("403") {
        return format!("{what}: permission denied (check RBAC)");
    }

    if raw.contains("connection refused") || raw.contains("ECONNREFUSED") {
        return format!("{what}: cannot connect to Kubernetes API");
    }

    if raw.contains("timeout") || raw.contains("deadline exceeded") {
        return format!("{what}: operation timed out");
    }

    format!("{what}: {raw}")
}
