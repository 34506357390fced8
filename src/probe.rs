//! Remote state probe
//!
//! Answers "can I currently observe this object?" and nothing else. Every
//! failure mode of the underlying describe call collapses into absence, but
//! the reason is kept in `ProbeOutcome::Unreachable` so callers and logs can
//! still tell a clean not-found from an absorbed error.
//!
//! No retries happen here; pair a probe with `eventually` for that.

use crate::remote::{RemoteError, RemoteObject, RemoteService};
use crate::resource::RemoteKind;
use std::sync::Arc;
use tracing::debug;

/// What a single probe saw
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The object is visible
    Found(RemoteObject),
    /// The service reported the object does not exist
    NotFound,
    /// The call failed; treated as not found
    Unreachable(String),
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Not found, whether reported or absorbed
    #[must_use]
    pub fn is_absent(&self) -> bool {
        !self.is_found()
    }

    #[must_use]
    pub fn object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Found(obj) => Some(obj),
            Self::NotFound | Self::Unreachable(_) => None,
        }
    }

    /// One-line summary for diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Found(obj) => format!("found object named '{}'", obj.name),
            Self::NotFound => "not found".to_string(),
            Self::Unreachable(reason) => format!("unreachable ({reason})"),
        }
    }
}

/// Probe bound to one remote object family
#[derive(Clone)]
pub struct Probe {
    remote: Arc<dyn RemoteService>,
    kind: RemoteKind,
}

impl Probe {
    pub fn new(remote: Arc<dyn RemoteService>, kind: RemoteKind) -> Self {
        Self { remote, kind }
    }

    /// Describe `identifier` once, never failing
    pub async fn probe(&self, identifier: &str) -> ProbeOutcome {
        match self.remote.describe(self.kind, identifier).await {
            Ok(obj) => ProbeOutcome::Found(obj),
            Err(RemoteError::NotFound(_)) => ProbeOutcome::NotFound,
            Err(e) => {
                debug!(identifier = %identifier, error = %e, "Probe error treated as not found");
                ProbeOutcome::Unreachable(e.to_string())
            }
        }
    }

    /// Whether `identifier` is visible and carries `expected_name`
    pub async fn exists(&self, identifier: &str, expected_name: &str) -> bool {
        self.probe(identifier)
            .await
            .object()
            .is_some_and(|obj| obj.name == expected_name)
    }
}
