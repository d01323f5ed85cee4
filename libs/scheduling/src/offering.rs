//! Offerings: the concrete capacity shapes a claim can land on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels::{CAPACITY_TYPE_ON_DEMAND, LABEL_CAPACITY_TYPE};
use crate::{Requirement, Requirements, ResourceList};

/// A purchasable variant of an offering, such as on-demand capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingVariant {
    #[serde(default)]
    pub requirements: Requirements,
    pub available: bool,
}

impl OfferingVariant {
    pub fn on_demand(available: bool) -> Self {
        Self {
            requirements: Requirements::new().with(Requirement::in_values(
                LABEL_CAPACITY_TYPE,
                [CAPACITY_TYPE_ON_DEMAND],
            )),
            available,
        }
    }
}

/// An instance shape with its requirements, capacity and overhead.
///
/// `name` is the flavor reference passed to the compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub name: String,
    #[serde(default)]
    pub requirements: Requirements,
    pub capacity: ResourceList,
    #[serde(default)]
    pub overhead: ResourceList,
    #[serde(default = "default_variants")]
    pub variants: Vec<OfferingVariant>,
}

fn default_variants() -> Vec<OfferingVariant> {
    vec![OfferingVariant::on_demand(true)]
}

impl Offering {
    pub fn new(name: impl Into<String>, capacity: ResourceList) -> Self {
        Self {
            name: name.into(),
            requirements: Requirements::new(),
            capacity,
            overhead: ResourceList::new(),
            variants: default_variants(),
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.insert(requirement);
        self
    }

    pub fn with_overhead(mut self, overhead: ResourceList) -> Self {
        self.overhead = overhead;
        self
    }

    pub fn with_variants(mut self, variants: Vec<OfferingVariant>) -> Self {
        self.variants = variants;
        self
    }

    /// Capacity minus overhead, clamped at zero per resource.
    pub fn allocatable(&self) -> ResourceList {
        self.capacity.saturating_sub(&self.overhead)
    }

    /// Labels implied by requirements that admit exactly one value.
    pub fn single_valued_labels(&self) -> BTreeMap<String, String> {
        self.requirements.single_valued_labels()
    }
}
