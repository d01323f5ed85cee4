//! Instance lifecycle: launching a claim's instance and deleting it.
//!
//! Each offering attempt moves through:
//!
//! ```text
//! PENDING ──create──▶ CREATED ──poll──▶ ACTIVE
//!    │                   │
//!    ▼                   ├──▶ ERROR / DELETED ──cleanup──▶ next offering
//!  FAILED ─▶ next        ├──▶ TIMEOUT ─────────cleanup──▶ next offering
//!                        └──▶ CANCELLED (stop, instance left for the caller)
//! ```
//!
//! Offerings are attempted strictly one at a time, in the order given.

use std::collections::BTreeMap;
use std::sync::Arc;

use stratus_id::ProviderId;
use stratus_reconcile::{wait_for, CancelReason, CancelSignal, PollSpec, WaitError};
use stratus_scheduling::Offering;
use tracing::{debug, info, warn};

use crate::backend::{ComputeBackend, CreateInstanceRequest};
use crate::error::{AttemptError, AttemptFailure, Cleanup, ProvisionError};
use crate::model::{Claim, Instance, InstanceStatus, NodeClass};

/// Metadata key recording the owning claim.
pub const CLAIM_METADATA_KEY: &str = "stratus.dev/claim";

/// Metadata key recording the cluster.
pub const CLUSTER_METADATA_KEY: &str = "stratus.dev/cluster-name";

/// Instance provider settings.
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub cluster_name: String,

    /// Instance names are `{name_prefix}-{claim}`.
    pub name_prefix: String,

    pub poll: PollSpec,

    /// Delete instances that fail to become active.
    pub cleanup_on_failure: bool,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            cluster_name: "stratus".to_string(),
            name_prefix: "stratus".to_string(),
            poll: PollSpec::default(),
            cleanup_on_failure: true,
        }
    }
}

/// Launches and deletes compute instances.
pub struct InstanceProvider {
    backend: Arc<dyn ComputeBackend>,
    settings: InstanceSettings,
}

/// How the wait for an instance ended, when it did not become active.
enum Unready {
    Failed(AttemptFailure),
    Cancelled(CancelReason),
}

impl InstanceProvider {
    pub fn new(backend: Arc<dyn ComputeBackend>, settings: InstanceSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    /// Launch one active instance for `claim`, trying `offerings` in order.
    ///
    /// Returns the first instance that reaches `ACTIVE`. Failed attempts are
    /// isolated: each is recorded and the next offering is tried.
    pub async fn create(
        &self,
        claim: &Claim,
        node_class: &NodeClass,
        offerings: &[Offering],
        cancel: &CancelSignal,
    ) -> Result<Instance, ProvisionError> {
        if offerings.is_empty() {
            return Err(ProvisionError::NoEligibleCapacity {
                claim: claim.name.clone(),
            });
        }

        let image_id = node_class
            .resolve_image()
            .ok_or_else(|| ProvisionError::InvalidNodeClass {
                name: node_class.name.clone(),
                reason: "no image selector term carries an id and image_ref is unset".to_string(),
            })?;

        let mut attempts = Vec::with_capacity(offerings.len());

        for offering in offerings {
            if let Some(reason) = cancel.reason() {
                return Err(ProvisionError::Cancelled {
                    claim: claim.name.clone(),
                    offering: offering.name.clone(),
                    instance_id: None,
                    reason,
                });
            }

            let request = self.build_request(claim, node_class, image_id, offering);
            info!(
                claim = %claim.name,
                offering = %offering.name,
                instance_name = %request.name,
                "Creating instance"
            );

            let instance = match self.backend.create_instance(&request).await {
                Ok(instance) => instance,
                Err(e) => {
                    warn!(offering = %offering.name, error = %e, "Instance create failed, trying next offering");
                    attempts.push(AttemptError::create_failed(&offering.name, e));
                    continue;
                }
            };

            // The id becomes the claim's provider id; one that cannot be encoded
            // would leave an untracked instance behind.
            if let Err(e) = ProviderId::new(instance.instance_id.as_str()) {
                warn!(
                    offering = %offering.name,
                    instance_id = %instance.instance_id,
                    error = %e,
                    "Backend returned an unusable instance id, trying next offering"
                );
                let cleanup = self.cleanup(&instance.instance_id).await;
                attempts.push(AttemptError {
                    offering: offering.name.clone(),
                    instance_id: Some(instance.instance_id),
                    cleanup,
                    failure: AttemptFailure::InvalidInstanceId(e),
                });
                continue;
            }

            match self.wait_until_active(&instance.instance_id, cancel).await {
                Ok(status) => {
                    info!(
                        claim = %claim.name,
                        offering = %offering.name,
                        instance_id = %instance.instance_id,
                        "Instance active"
                    );
                    return Ok(Instance { status, ..instance });
                }
                Err(Unready::Cancelled(reason)) => {
                    warn!(
                        instance_id = %instance.instance_id,
                        %reason,
                        "Wait for instance stopped; leaving instance to the caller"
                    );
                    return Err(ProvisionError::Cancelled {
                        claim: claim.name.clone(),
                        offering: offering.name.clone(),
                        instance_id: Some(instance.instance_id),
                        reason,
                    });
                }
                Err(Unready::Failed(failure)) => {
                    warn!(
                        offering = %offering.name,
                        instance_id = %instance.instance_id,
                        error = %failure,
                        "Instance did not become active, trying next offering"
                    );
                    let cleanup = self.cleanup(&instance.instance_id).await;
                    attempts.push(AttemptError {
                        offering: offering.name.clone(),
                        instance_id: Some(instance.instance_id),
                        cleanup,
                        failure,
                    });
                }
            }
        }

        Err(ProvisionError::OfferingsExhausted {
            claim: claim.name.clone(),
            attempts,
        })
    }

    /// Delete the instance behind `provider_id`.
    ///
    /// A malformed id fails before any backend call. A missing instance is
    /// reported as [`ProvisionError::InstanceNotFound`].
    pub async fn delete(&self, provider_id: &str) -> Result<(), ProvisionError> {
        let id = ProviderId::parse(provider_id)?;

        let result = self.backend.delete_instance(id.instance_id()).await;
        match result {
            Ok(()) => {
                info!(provider_id = %id, "Instance deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                Err(ProvisionError::InstanceNotFound(id.into_instance_id()))
            }
            Err(e) => Err(ProvisionError::Backend(e)),
        }
    }

    fn build_request(
        &self,
        claim: &Claim,
        node_class: &NodeClass,
        image_id: &str,
        offering: &Offering,
    ) -> CreateInstanceRequest {
        let spec = &node_class.spec;

        let mut metadata: BTreeMap<String, String> = spec.labels.clone();
        metadata.extend(spec.metadata.clone());
        metadata.insert(CLAIM_METADATA_KEY.to_string(), claim.name.clone());
        metadata.insert(
            CLUSTER_METADATA_KEY.to_string(),
            self.settings.cluster_name.clone(),
        );

        CreateInstanceRequest {
            name: format!("{}-{}", self.settings.name_prefix, claim.name),
            image_id: image_id.to_string(),
            flavor: offering.name.clone(),
            networks: spec.networks.clone(),
            security_groups: spec.security_groups.clone(),
            user_data: spec.user_data.clone(),
            key_pair: spec.key_pair.clone(),
            metadata,
        }
    }

    async fn wait_until_active(
        &self,
        instance_id: &str,
        cancel: &CancelSignal,
    ) -> Result<InstanceStatus, Unready> {
        let backend = &self.backend;
        let resource = format!("instance {instance_id}");

        let result = wait_for(&resource, &self.settings.poll, cancel, move || async move {
            match backend.get_instance_status(instance_id).await {
                Ok(status) => Ok(Some(status)),
                Err(e) if e.is_not_found() => Err(e),
                Err(e) => {
                    warn!(instance_id, error = %e, "Status lookup failed, polling again");
                    Ok(None)
                }
            }
        })
        .await;

        match result {
            Ok(converged) => {
                debug!(
                    instance_id,
                    attempts = converged.attempts,
                    elapsed_ms = converged.elapsed.as_millis() as u64,
                    "Instance converged"
                );
                Ok(converged.value)
            }
            Err(WaitError::Diverged { observed, .. }) => {
                Err(Unready::Failed(AttemptFailure::Failed { status: observed }))
            }
            Err(WaitError::Timeout {
                elapsed, attempts, ..
            }) => Err(Unready::Failed(AttemptFailure::Timeout { elapsed, attempts })),
            Err(WaitError::Probe { source, .. }) => {
                Err(Unready::Failed(AttemptFailure::StatusLookup(source)))
            }
            Err(WaitError::Cancelled { reason, .. }) => Err(Unready::Cancelled(reason)),
        }
    }

    async fn cleanup(&self, instance_id: &str) -> Cleanup {
        if !self.settings.cleanup_on_failure {
            return Cleanup::Disabled;
        }

        match self.backend.delete_instance(instance_id).await {
            Ok(()) => {
                debug!(instance_id, "Compensating delete succeeded");
                Cleanup::Deleted
            }
            Err(e) if e.is_not_found() => Cleanup::Deleted,
            Err(e) => {
                warn!(instance_id, error = %e, "Compensating delete failed");
                Cleanup::Failed(e.to_string())
            }
        }
    }
}
