//! Claim reconciler.
//!
//! Resolves a claim into a running instance and keeps the claim in step with
//! the instance's lifecycle:
//!
//! 1. Resolve the node class the claim references
//! 2. List offerings for that class and filter them for the claim
//! 3. Launch an instance on the first offering that works
//! 4. Project the instance onto the claim's status and labels
//!
//! The reconciler never retries internally; errors carry enough
//! classification for the caller to decide.

use std::sync::Arc;

use stratus_events::{reasons, Event, EventSink, ObjectRef};
use stratus_reconcile::CancelSignal;
use stratus_scheduling::{Offering, RequirementMatcher};
use tracing::{debug, info, instrument};

use crate::catalog::OfferingCatalog;
use crate::class_store::NodeClassStore;
use crate::error::ProvisionError;
use crate::instance::InstanceProvider;
use crate::model::{Claim, NodeClass};
use crate::status;

/// Provider name reported to callers.
pub const PROVIDER_NAME: &str = "openstack";

/// Reconciles claims against the compute backend.
///
/// Holds only shared collaborators and immutable settings, so one value can
/// serve many claims concurrently.
pub struct CloudProvider {
    classes: Arc<dyn NodeClassStore>,
    catalog: Arc<dyn OfferingCatalog>,
    instances: InstanceProvider,
    matcher: RequirementMatcher,
    events: Arc<dyn EventSink>,
}

impl CloudProvider {
    pub fn new(
        classes: Arc<dyn NodeClassStore>,
        catalog: Arc<dyn OfferingCatalog>,
        instances: InstanceProvider,
        matcher: RequirementMatcher,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            classes,
            catalog,
            instances,
            matcher,
            events,
        }
    }

    pub fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    /// Provision an instance for `claim` and return the claim with its
    /// status filled in.
    #[instrument(skip(self, claim, cancel), fields(claim = %claim.name))]
    pub async fn create(&self, claim: &Claim, cancel: &CancelSignal) -> Result<Claim, ProvisionError> {
        let node_class = self.resolve_node_class(claim).await?;
        let offerings = self.eligible_offerings(claim, &node_class).await?;

        if offerings.is_empty() {
            return Err(ProvisionError::NoEligibleCapacity {
                claim: claim.name.clone(),
            });
        }
        debug!(
            count = offerings.len(),
            first = %offerings[0].name,
            "Eligible offerings resolved"
        );

        let instance = match self
            .instances
            .create(claim, &node_class, &offerings, cancel)
            .await
        {
            Ok(instance) => instance,
            Err(e) => {
                self.report_failure(claim, &e);
                return Err(e);
            }
        };

        let offering = offerings.iter().find(|o| o.name == instance.offering);
        let provisioned = status::project(claim.clone(), &instance, offering)?;

        info!(
            instance_id = %instance.instance_id,
            offering = %instance.offering,
            "Claim provisioned"
        );
        self.events.publish(Event::normal(
            ObjectRef::claim(&claim.name),
            reasons::LAUNCHED,
            format!(
                "Launched instance {} ({})",
                instance.instance_id, instance.offering
            ),
        ));

        Ok(provisioned)
    }

    /// Delete the instance backing `claim`.
    ///
    /// An instance that is already gone counts as deleted.
    #[instrument(skip(self, claim), fields(claim = %claim.name))]
    pub async fn delete(&self, claim: &Claim) -> Result<(), ProvisionError> {
        let provider_id =
            claim
                .status
                .provider_id
                .as_deref()
                .ok_or_else(|| ProvisionError::MissingProviderId {
                    claim: claim.name.clone(),
                })?;

        match self.instances.delete(provider_id).await {
            Ok(()) => {
                self.events.publish(Event::normal(
                    ObjectRef::claim(&claim.name),
                    reasons::TERMINATED,
                    format!("Deleted instance {provider_id}"),
                ));
                Ok(())
            }
            Err(ProvisionError::InstanceNotFound(id)) => {
                debug!(instance_id = %id, "Instance already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Offerings `claim` can land on, in catalog order.
    pub async fn eligible_offerings(
        &self,
        claim: &Claim,
        node_class: &NodeClass,
    ) -> Result<Vec<Offering>, ProvisionError> {
        let catalog = self.catalog.list(node_class).await?;
        let total = catalog.len();

        let eligible = self.matcher.eligible(
            &claim.spec.requirements,
            &claim.spec.resources.requests,
            catalog,
        );
        debug!(total, eligible = eligible.len(), "Filtered offerings");
        Ok(eligible)
    }

    async fn resolve_node_class(&self, claim: &Claim) -> Result<NodeClass, ProvisionError> {
        let reference =
            claim
                .spec
                .node_class_ref
                .as_ref()
                .ok_or_else(|| ProvisionError::MissingNodeClassRef {
                    claim: claim.name.clone(),
                })?;

        match self.classes.get(&reference.name).await {
            Ok(class) => Ok(class),
            Err(e) if e.is_not_found() => {
                self.events.publish(Event::warning(
                    ObjectRef::claim(&claim.name),
                    reasons::NODE_CLASS_NOT_FOUND,
                    format!("Node class {} does not exist", reference.name),
                ));
                Err(ProvisionError::NodeClassNotFound {
                    name: reference.name.clone(),
                })
            }
            Err(e) => Err(ProvisionError::NodeClassStore(e)),
        }
    }

    fn report_failure(&self, claim: &Claim, error: &ProvisionError) {
        if let ProvisionError::OfferingsExhausted { attempts, .. } = error {
            self.events.publish(Event::warning(
                ObjectRef::claim(&claim.name),
                reasons::INSUFFICIENT_CAPACITY,
                format!("All {} eligible offerings failed", attempts.len()),
            ));
        }

        for instance_id in error.leaked_instance_ids() {
            self.events.publish(Event::warning(
                ObjectRef::claim(&claim.name),
                reasons::INSTANCE_LEAKED,
                format!("Instance {instance_id} could not be cleaned up"),
            ));
        }
    }
}
