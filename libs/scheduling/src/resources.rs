//! Named resource lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Quantity;

/// Resource name for CPU cores.
pub const CPU: &str = "cpu";
/// Resource name for memory, in bytes.
pub const MEMORY: &str = "memory";
/// Resource name for the pod count.
pub const PODS: &str = "pods";
/// Resource name for ephemeral storage, in bytes.
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";

/// A mapping from resource name to quantity.
///
/// Used for claim requests, offering capacity, overhead and allocatable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceList(BTreeMap<String, Quantity>);

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Quantity> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, quantity: Quantity) -> Option<Quantity> {
        self.0.insert(name.into(), quantity)
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, quantity: Quantity) -> Self {
        self.insert(name, quantity);
        self
    }

    /// Adds `quantity` to whatever is already recorded under `name`.
    pub fn add(&mut self, name: impl Into<String>, quantity: Quantity) {
        let entry = self.0.entry(name.into()).or_default();
        *entry = entry.checked_add(quantity).unwrap_or(Quantity::from_millis(i128::MAX));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Quantity)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Subtracts `other` per resource, clamping at zero.
    ///
    /// Resources present only in `other` are ignored.
    pub fn saturating_sub(&self, other: &ResourceList) -> ResourceList {
        self.0
            .iter()
            .map(|(name, q)| {
                let taken = other.get(name).unwrap_or_default();
                (name.clone(), q.saturating_sub(taken))
            })
            .collect()
    }

    /// Returns a copy without zero-valued entries.
    pub fn non_zero(&self) -> ResourceList {
        self.0
            .iter()
            .filter(|(_, q)| !q.is_zero())
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Quantity)> for ResourceList {
    fn from_iter<I: IntoIterator<Item = (K, Quantity)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_sub() {
        let capacity = ResourceList::new()
            .with(CPU, Quantity::from_units(2))
            .with(MEMORY, Quantity::from_gibibytes(4));
        let overhead = ResourceList::new()
            .with(CPU, Quantity::from_units(3))
            .with(MEMORY, Quantity::from_gibibytes(1))
            .with(PODS, Quantity::from_units(5));

        let allocatable = capacity.saturating_sub(&overhead);
        assert_eq!(allocatable.get(CPU), Some(Quantity::ZERO));
        assert_eq!(allocatable.get(MEMORY), Some(Quantity::from_gibibytes(3)));
        assert_eq!(allocatable.get(PODS), None);
    }

    #[test]
    fn test_non_zero() {
        let list = ResourceList::new()
            .with(CPU, Quantity::ZERO)
            .with(MEMORY, Quantity::from_units(1));
        let filtered = list.non_zero();
        assert_eq!(filtered.len(), 1);
        assert!(filtered.get(CPU).is_none());
    }

    #[test]
    fn test_add_accumulates() {
        let mut list = ResourceList::new();
        list.add(MEMORY, Quantity::from_mebibytes(100));
        list.add(MEMORY, Quantity::from_mebibytes(100));
        assert_eq!(list.get(MEMORY), Some(Quantity::from_mebibytes(200)));
    }

    #[test]
    fn test_serde_from_strings() {
        let list: ResourceList = serde_json::from_str(r#"{"cpu":"500m","memory":"2Gi"}"#).unwrap();
        assert_eq!(list.get(CPU), Some(Quantity::from_millis(500)));
        assert_eq!(list.get(MEMORY), Some(Quantity::from_gibibytes(2)));
    }
}
