//! Projection of a launched instance onto claim status.

use stratus_id::ProviderId;
use stratus_scheduling::labels::LABEL_INSTANCE_TYPE;
use stratus_scheduling::Offering;

use crate::error::ProvisionError;
use crate::model::{Claim, Instance};

/// Writes the instance into `claim`'s status and labels.
///
/// Labels come from every offering requirement that admits exactly one
/// value, plus the instance type the instance was launched with. Capacity and
/// allocatable keep only non-zero resources.
pub fn project(
    mut claim: Claim,
    instance: &Instance,
    offering: Option<&Offering>,
) -> Result<Claim, ProvisionError> {
    let provider_id = ProviderId::new(instance.instance_id.as_str())?;

    if let Some(offering) = offering {
        claim.labels.extend(offering.single_valued_labels());
        claim.status.capacity = offering.capacity.non_zero();
        claim.status.allocatable = offering.allocatable().non_zero();
    }
    claim
        .labels
        .insert(LABEL_INSTANCE_TYPE.to_string(), instance.offering.clone());

    claim.status.provider_id = Some(provider_id.to_string());
    claim.status.image_id = Some(instance.image_id.clone());

    Ok(claim)
}
