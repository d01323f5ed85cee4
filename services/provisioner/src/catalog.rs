//! Offering catalogs.
//!
//! A catalog lists the offerings available for a node class. Two
//! implementations are provided:
//!
//! - [`StaticCatalog`]: a fixed list, as loaded from a file or built in tests
//! - [`FlavorCatalog`]: derives offerings from compute flavor records

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_scheduling::labels::{ARCH_AMD64, LABEL_ARCH, LABEL_INSTANCE_TYPE, LABEL_OS, OS_LINUX};
use stratus_scheduling::resources::{CPU, EPHEMERAL_STORAGE, MEMORY, PODS};
use stratus_scheduling::{Offering, Quantity, QuantityError, Requirement, ResourceList};
use thiserror::Error;
use tracing::debug;

use crate::model::{KubeletConfiguration, NodeClass};

/// Pod capacity when the node class does not set `max_pods`.
pub const DEFAULT_MAX_PODS: u32 = 110;

const EVICTION_MEMORY_AVAILABLE: &str = "memory.available";
const EVICTION_NODEFS_AVAILABLE: &str = "nodefs.available";

/// Errors returned while listing offerings.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("node class {node_class}: invalid {field} value '{value}'")]
    InvalidQuantity {
        node_class: String,
        field: String,
        value: String,
        #[source]
        source: QuantityError,
    },

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of offerings for a node class.
#[async_trait]
pub trait OfferingCatalog: Send + Sync {
    async fn list(&self, node_class: &NodeClass) -> Result<Vec<Offering>, CatalogError>;
}

/// A fixed list of offerings, returned as-is for every node class.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    offerings: Vec<Offering>,
}

impl StaticCatalog {
    pub fn new(offerings: Vec<Offering>) -> Self {
        Self { offerings }
    }
}

#[async_trait]
impl OfferingCatalog for StaticCatalog {
    async fn list(&self, _node_class: &NodeClass) -> Result<Vec<Offering>, CatalogError> {
        Ok(self.offerings.clone())
    }
}

/// A compute flavor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    /// Flavor name; used as the offering name and instance-type label.
    pub name: String,
    pub vcpus: u32,
    pub ram_mb: u64,
    #[serde(default)]
    pub disk_gb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Builds offerings from injected flavor records.
///
/// Capacity and overhead depend on the node class's kubelet settings, so the
/// offerings are derived on every `list`.
#[derive(Debug, Clone, Default)]
pub struct FlavorCatalog {
    flavors: Vec<Flavor>,
}

impl FlavorCatalog {
    pub fn new(flavors: Vec<Flavor>) -> Self {
        Self { flavors }
    }

    /// Derives the offering for one flavor under `node_class`.
    pub fn offering(flavor: &Flavor, node_class: &NodeClass) -> Result<Offering, CatalogError> {
        let kubelet = node_class.spec.kubelet.as_ref();

        let mut capacity = ResourceList::new()
            .with(CPU, Quantity::from_units(flavor.vcpus.into()))
            .with(MEMORY, Quantity::from_mebibytes(flavor.ram_mb as i64))
            .with(PODS, Quantity::from_units(max_pods(flavor, kubelet).into()));
        if flavor.disk_gb > 0 {
            capacity.insert(EPHEMERAL_STORAGE, Quantity::from_gibibytes(flavor.disk_gb as i64));
        }

        let overhead = match kubelet {
            Some(kubelet) => overhead(&node_class.name, kubelet)?,
            None => ResourceList::new(),
        };

        let arch = flavor.arch.as_deref().unwrap_or(ARCH_AMD64);

        Ok(Offering::new(flavor.name.clone(), capacity)
            .with_requirement(Requirement::in_values(LABEL_INSTANCE_TYPE, [flavor.name.as_str()]))
            .with_requirement(Requirement::in_values(LABEL_ARCH, [arch]))
            .with_requirement(Requirement::in_values(LABEL_OS, [OS_LINUX]))
            .with_overhead(overhead))
    }
}

fn max_pods(flavor: &Flavor, kubelet: Option<&KubeletConfiguration>) -> u32 {
    let configured = kubelet
        .and_then(|k| k.max_pods)
        .unwrap_or(DEFAULT_MAX_PODS);
    match kubelet.and_then(|k| k.pods_per_core) {
        Some(per_core) if per_core > 0 => configured.min(per_core.saturating_mul(flavor.vcpus)),
        _ => configured,
    }
}

fn overhead(node_class: &str, kubelet: &KubeletConfiguration) -> Result<ResourceList, CatalogError> {
    let mut overhead = ResourceList::new();

    let reserved = kubelet
        .kube_reserved
        .iter()
        .map(|(k, v)| ("kube_reserved", k, v))
        .chain(kubelet.system_reserved.iter().map(|(k, v)| ("system_reserved", k, v)));
    for (field, resource, value) in reserved {
        overhead.add(resource.as_str(), parse(node_class, field, value)?);
    }

    for (signal, threshold) in &kubelet.eviction_hard {
        let resource = match signal.as_str() {
            EVICTION_MEMORY_AVAILABLE => MEMORY,
            EVICTION_NODEFS_AVAILABLE => EPHEMERAL_STORAGE,
            _ => continue,
        };
        // Percentage thresholds depend on capacity and are not reserved up front.
        if threshold.ends_with('%') {
            continue;
        }
        overhead.add(resource, parse(node_class, "eviction_hard", threshold)?);
    }

    Ok(overhead)
}

fn parse(node_class: &str, field: &str, value: &str) -> Result<Quantity, CatalogError> {
    Quantity::parse(value).map_err(|source| CatalogError::InvalidQuantity {
        node_class: node_class.to_string(),
        field: field.to_string(),
        value: value.to_string(),
        source,
    })
}

#[async_trait]
impl OfferingCatalog for FlavorCatalog {
    async fn list(&self, node_class: &NodeClass) -> Result<Vec<Offering>, CatalogError> {
        let offerings = self
            .flavors
            .iter()
            .map(|flavor| Self::offering(flavor, node_class))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            node_class = %node_class.name,
            count = offerings.len(),
            "Listed offerings from flavors"
        );
        Ok(offerings)
    }
}
