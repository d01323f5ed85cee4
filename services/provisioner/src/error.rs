//! Provisioning errors.
//!
//! Errors fall into five groups that callers branch on:
//!
//! - **Fatal**: the claim or node class is malformed; retrying cannot help.
//! - **Not found**: a referenced object does not exist.
//! - **Exhausted**: every eligible offering was tried and failed.
//! - **Cancelled**: the caller stopped the operation; carries the in-flight instance.
//! - **Collaborator**: the backend, catalog or store failed.

use std::fmt;
use std::time::Duration;

use stratus_id::IdError;
use stratus_reconcile::CancelReason;
use thiserror::Error;

use crate::backend::BackendError;
use crate::catalog::CatalogError;
use crate::class_store::NodeClassStoreError;
use crate::model::InstanceStatus;

/// Errors returned by the instance provider and the claim reconciler.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid provider id: {0}")]
    InvalidProviderId(#[from] IdError),

    #[error("claim {claim} has no node class reference")]
    MissingNodeClassRef { claim: String },

    #[error("node class {name} not found")]
    NodeClassNotFound { name: String },

    #[error("claim {claim} has no provider id")]
    MissingProviderId { claim: String },

    #[error("no offering satisfies the requirements and requests of claim {claim}")]
    NoEligibleCapacity { claim: String },

    #[error("node class {name} is invalid: {reason}")]
    InvalidNodeClass { name: String, reason: String },

    #[error("all offerings failed for claim {claim}: {}", summarize(.attempts))]
    OfferingsExhausted {
        claim: String,
        attempts: Vec<AttemptError>,
    },

    #[error("provisioning claim {claim} on {offering} {reason}")]
    Cancelled {
        claim: String,
        offering: String,
        /// Instance created before the cancellation, left in place.
        instance_id: Option<String>,
        reason: CancelReason,
    },

    #[error("instance {0} not found")]
    InstanceNotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    NodeClassStore(NodeClassStoreError),
}

fn summarize(attempts: &[AttemptError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProvisionError {
    /// Malformed input: retrying without changing the claim or class cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidProviderId(_)
                | Self::MissingNodeClassRef { .. }
                | Self::MissingProviderId { .. }
                | Self::NoEligibleCapacity { .. }
                | Self::InvalidNodeClass { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeClassNotFound { .. } | Self::InstanceNotFound(_)
        )
    }

    /// Transient failures a caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OfferingsExhausted { .. } => true,
            Self::Backend(e) => !e.is_not_found(),
            Self::Catalog(CatalogError::Unavailable(_)) => true,
            Self::NodeClassStore(NodeClassStoreError::Unavailable(_)) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Every instance created during the failed operation.
    pub fn instance_ids(&self) -> Vec<&str> {
        match self {
            Self::OfferingsExhausted { attempts, .. } => attempts
                .iter()
                .filter_map(|a| a.instance_id.as_deref())
                .collect(),
            Self::Cancelled {
                instance_id: Some(id),
                ..
            } => vec![id.as_str()],
            _ => Vec::new(),
        }
    }

    /// Instances that may still exist and are owned by no claim.
    pub fn leaked_instance_ids(&self) -> Vec<&str> {
        match self {
            Self::OfferingsExhausted { attempts, .. } => attempts
                .iter()
                .filter(|a| a.is_leaked())
                .filter_map(|a| a.instance_id.as_deref())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// What happened to an instance after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    /// No instance was created.
    NotNeeded,
    /// The instance was deleted.
    Deleted,
    /// Compensating deletes are turned off.
    Disabled,
    /// The compensating delete failed.
    Failed(String),
}

/// Why a single offering attempt failed.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("create failed: {0}")]
    Create(#[source] BackendError),

    #[error("instance reached {status}")]
    Failed { status: InstanceStatus },

    #[error("instance not active after {elapsed:?} ({attempts} polls)")]
    Timeout { elapsed: Duration, attempts: u32 },

    #[error("status lookup failed: {0}")]
    StatusLookup(#[source] BackendError),

    #[error("backend returned an unusable instance id: {0}")]
    InvalidInstanceId(#[source] IdError),
}

impl AttemptFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The failure of one offering attempt.
#[derive(Debug)]
pub struct AttemptError {
    pub offering: String,
    pub instance_id: Option<String>,
    pub cleanup: Cleanup,
    pub failure: AttemptFailure,
}

impl AttemptError {
    pub(crate) fn create_failed(offering: &str, source: BackendError) -> Self {
        Self {
            offering: offering.to_string(),
            instance_id: None,
            cleanup: Cleanup::NotNeeded,
            failure: AttemptFailure::Create(source),
        }
    }

    /// Whether the compensating delete succeeded.
    pub fn cleaned_up(&self) -> bool {
        self.cleanup == Cleanup::Deleted
    }

    /// An instance exists and was not deleted.
    pub fn is_leaked(&self) -> bool {
        self.instance_id.is_some() && !self.cleaned_up()
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.offering, self.failure)?;
        if let Some(id) = &self.instance_id {
            match &self.cleanup {
                Cleanup::Deleted => write!(f, " (instance {id} deleted)")?,
                Cleanup::Disabled => write!(f, " (instance {id} left in place)")?,
                Cleanup::Failed(e) => write!(f, " (instance {id} not deleted: {e})")?,
                Cleanup::NotNeeded => write!(f, " (instance {id})")?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}
