//! Compute backend interface.
//!
//! The backend abstracts instance lifecycle calls against the compute API:
//! - Creating an instance from a flavor and image
//! - Reading its status
//! - Deleting it
//!
//! [`NovaClient`] talks to the OpenStack Compute API; [`MockBackend`] is an
//! in-memory implementation for tests and dry runs.

mod mock;
mod openstack;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Instance, InstanceStatus};

pub use mock::MockBackend;
pub use openstack::{NovaClient, NovaConfig};

/// Everything needed to launch one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub image_id: String,
    /// Flavor reference (the offering name).
    pub flavor: String,
    pub networks: Vec<String>,
    pub security_groups: Vec<String>,
    pub user_data: Option<String>,
    pub key_pair: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Errors returned by a compute backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("instance {0} not found")]
    NotFound(String),

    #[error("compute API rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("compute API unreachable: {0}")]
    Transport(String),

    #[error("unexpected compute API response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Compute backend operations.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Launch an instance. Returns as soon as the backend accepted it.
    async fn create_instance(&self, request: &CreateInstanceRequest)
        -> Result<Instance, BackendError>;

    /// Read the current status of an instance.
    async fn get_instance_status(&self, instance_id: &str) -> Result<InstanceStatus, BackendError>;

    /// Delete an instance. Fails with [`BackendError::NotFound`] if it is gone.
    async fn delete_instance(&self, instance_id: &str) -> Result<(), BackendError>;
}
