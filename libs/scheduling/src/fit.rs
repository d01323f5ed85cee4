//! ResourceFitChecker: whether an offering's allocatable covers a claim's requests.

use crate::ResourceList;

/// Returns true when every strictly positive request is covered.
///
/// Zero or absent requests are ignored. A positive request for a resource
/// the offering does not advertise does not fit.
pub fn fits(requests: &ResourceList, allocatable: &ResourceList) -> bool {
    requests
        .iter()
        .filter(|(_, q)| q.is_positive())
        .all(|(name, requested)| allocatable.get(name).is_some_and(|a| a >= requested))
}

/// Names of the requested resources that `allocatable` does not cover.
pub fn shortfall<'a>(requests: &'a ResourceList, allocatable: &ResourceList) -> Vec<&'a str> {
    requests
        .iter()
        .filter(|(_, q)| q.is_positive())
        .filter(|(name, requested)| !allocatable.get(name).is_some_and(|a| a >= *requested))
        .map(|(name, _)| name)
        .collect()
}
