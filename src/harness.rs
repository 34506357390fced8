//! Shared harness state
//!
//! A `Harness` bundles the two clients (Kubernetes and remote), the run
//! configuration, and bootstrap lookups. It is cheap to clone and every
//! lifecycle fixture holds one.

use crate::bootstrap::{BootstrapError, BootstrapResources};
use crate::config::{ConfigError, HarnessConfig};
use crate::kube_client::{ClientError, KubeResourceClient, ResourceClient};
use crate::lifecycle::Lifecycle;
use crate::probe::Probe;
use crate::remote::{AwsCliRemote, RemoteService};
use crate::resource::{DesiredResource, ResourceKind};
use crate::template::{Replacements, TemplateError, TemplateLoader};
use std::sync::Arc;
use tracing::info;

/// Errors building a harness or a desired resource
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// Clients and configuration shared by all fixtures in a run
#[derive(Clone)]
pub struct Harness {
    kube: Arc<dyn ResourceClient>,
    remote: Arc<dyn RemoteService>,
    config: Arc<HarnessConfig>,
    bootstrap: BootstrapResources,
}

impl Harness {
    /// Assemble a harness from explicit clients
    pub fn new(
        kube: Arc<dyn ResourceClient>,
        remote: Arc<dyn RemoteService>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            kube,
            remote,
            config: Arc::new(config),
            bootstrap: BootstrapResources::new(),
        }
    }

    /// Connect to the current cluster and the `aws` CLI, reading overrides
    /// from the environment
    pub async fn from_env() -> Result<Self, HarnessError> {
        let config = HarnessConfig::from_env()?;
        let kube = KubeResourceClient::try_default().await?;

        info!(
            service = %config.service,
            namespace = %config.namespace,
            resource_dir = %config.resource_dir.display(),
            "Harness ready"
        );

        Ok(Self::new(Arc::new(kube), Arc::new(AwsCliRemote::from_env()), config)
            .with_bootstrap(BootstrapResources::from_env()))
    }

    /// Replace the bootstrap resources
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: BootstrapResources) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn kube(&self) -> &Arc<dyn ResourceClient> {
        &self.kube
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService> {
        &self.remote
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn bootstrap(&self) -> &BootstrapResources {
        &self.bootstrap
    }

    /// Probe for the remote family behind `kind`
    #[must_use]
    pub fn probe(&self, kind: &ResourceKind) -> Probe {
        Probe::new(self.remote.clone(), kind.remote)
    }

    /// Loader over the configured template directory
    #[must_use]
    pub fn templates(&self) -> TemplateLoader {
        TemplateLoader::new(&self.config.resource_dir)
    }

    /// Render `template` into a desired resource named `name`
    pub fn desired(
        &self,
        kind: &ResourceKind,
        name: &str,
        template: &str,
        replacements: &Replacements,
    ) -> Result<DesiredResource, HarnessError> {
        let payload = self.templates().load(template, replacements)?;
        let reference = kind.reference(name, &self.config.namespace);
        Ok(DesiredResource::new(reference, payload))
    }

    /// Fixture for one resource instance
    #[must_use]
    pub fn lifecycle(&self, kind: ResourceKind, desired: DesiredResource) -> Lifecycle {
        Lifecycle::new(self.clone(), kind, desired)
    }
}
