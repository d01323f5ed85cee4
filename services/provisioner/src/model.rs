//! Domain model: claims, node classes and instances.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_reconcile::{ConvergenceStatus, Observed};
use stratus_scheduling::{Quantity, Requirement, ResourceList};

// =============================================================================
// Claim
// =============================================================================

/// A request for one unit of capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub name: String,

    /// Labels written on successful provisioning.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub spec: ClaimSpec,

    #[serde(default)]
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSpec {
    #[serde(default)]
    pub requirements: Vec<Requirement>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_class_ref: Option<NodeClassRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeClassRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatus {
    /// `openstack:///<instance-id>`; kept as written so that a malformed
    /// value surfaces as a parse error when it is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    #[serde(default)]
    pub capacity: ResourceList,

    #[serde(default)]
    pub allocatable: ResourceList,
}

impl Claim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.spec.requirements.push(requirement);
        self
    }

    pub fn with_request(mut self, resource: &str, quantity: Quantity) -> Self {
        self.spec.resources.requests.insert(resource, quantity);
        self
    }

    pub fn with_node_class(mut self, name: impl Into<String>) -> Self {
        self.spec.node_class_ref = Some(NodeClassRef { name: name.into() });
        self
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.status.provider_id = Some(provider_id.into());
        self
    }

    pub fn is_provisioned(&self) -> bool {
        self.status.provider_id.is_some()
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// Provider-specific launch parameters shared by many claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeClass {
    pub name: String,

    #[serde(default)]
    pub spec: NodeClassSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeClassSpec {
    #[serde(default)]
    pub image_selector_terms: Vec<ImageSelectorTerm>,

    /// Image used when no selector term names an id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Network UUIDs.
    #[serde(default)]
    pub networks: Vec<String>,

    #[serde(default)]
    pub security_groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfiguration>,

    /// Labels stamped onto instance metadata.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Extra instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSelectorTerm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Kubelet tuning that shapes offering capacity and overhead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeletConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods_per_core: Option<u32>,

    #[serde(default)]
    pub system_reserved: BTreeMap<String, String>,

    #[serde(default)]
    pub kube_reserved: BTreeMap<String, String>,

    /// Signal → threshold, e.g. `memory.available: 100Mi`.
    #[serde(default)]
    pub eviction_hard: BTreeMap<String, String>,

    #[serde(default)]
    pub cluster_dns: Vec<String>,
}

impl NodeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: NodeClassSpec::default(),
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.spec.image_selector_terms.push(ImageSelectorTerm {
            id: Some(image_id.into()),
            alias: None,
        });
        self
    }

    /// Resolves the launch image: the first selector term with an id, then
    /// `image_ref`.
    pub fn resolve_image(&self) -> Option<&str> {
        self.spec
            .image_selector_terms
            .iter()
            .filter_map(|term| term.id.as_deref())
            .find(|id| !id.is_empty())
            .or_else(|| self.spec.image_ref.as_deref().filter(|id| !id.is_empty()))
    }
}

// =============================================================================
// Instance
// =============================================================================

/// Instance lifecycle status as reported by the compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Build,
    Active,
    Error,
    Deleted,
    /// Any other backend status (`REBOOT`, `SHUTOFF`, ...).
    Other(String),
}

impl InstanceStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BUILD" => Self::Build,
            "ACTIVE" => Self::Active,
            "ERROR" => Self::Error,
            "DELETED" => Self::Deleted,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Build => "BUILD",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
            Self::Deleted => "DELETED",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Observed for InstanceStatus {
    fn convergence(&self) -> ConvergenceStatus {
        match self {
            Self::Active => ConvergenceStatus::Converged,
            Self::Build => ConvergenceStatus::Converging,
            Self::Error | Self::Deleted => ConvergenceStatus::Diverged,
            Self::Other(_) => ConvergenceStatus::Unknown,
        }
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstanceStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A compute instance created for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub name: String,
    /// Flavor the instance was created with.
    pub offering: String,
    pub image_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
}
