//! RequirementMatcher: decides which offerings a claim may land on.
//!
//! Filtering runs in three stages, in order:
//!
//! 1. **Requirements**: every claim requirement must be compatible with the
//!    offering's requirements.
//! 2. **Variants**: at least one available variant must be compatible with
//!    the offering's requirements narrowed by the variant's own.
//! 3. **Fit**: the offering's allocatable must cover the claim's requests.
//!
//! Catalog order is preserved; there is no scoring.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{fit, LabelConfig, Offering, Requirement, Requirements, ResourceList};

/// How to treat a claim requirement on a key the offering does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndefinedLabelPolicy {
    /// Undefined keys never cause a mismatch.
    #[default]
    Allow,
    /// Requiring a well-known key the offering does not declare is a mismatch.
    DenyWellKnown,
}

/// Why a claim requirement rejected an offering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompatibility {
    Undefined {
        key: String,
    },
    Disjoint {
        key: String,
    },
    TooFewValues {
        key: String,
        available: usize,
        min_values: usize,
    },
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incompatibility::Undefined { key } => {
                write!(f, "well-known label '{key}' is not defined by the offering")
            }
            Incompatibility::Disjoint { key } => write!(f, "no common value for '{key}'"),
            Incompatibility::TooFewValues {
                key,
                available,
                min_values,
            } => write!(
                f,
                "'{key}' admits {available} value(s), at least {min_values} required"
            ),
        }
    }
}

/// Matches claim requirements against offerings.
#[derive(Debug, Clone, Default)]
pub struct RequirementMatcher {
    labels: LabelConfig,
    undefined: UndefinedLabelPolicy,
}

impl RequirementMatcher {
    pub fn new(labels: LabelConfig, undefined: UndefinedLabelPolicy) -> Self {
        Self { labels, undefined }
    }

    pub fn labels(&self) -> &LabelConfig {
        &self.labels
    }

    /// Whether every claim requirement is compatible with `offering`.
    pub fn compatible(&self, claim: &[Requirement], offering: &Requirements) -> bool {
        self.incompatibility(claim, offering).is_none()
    }

    /// The first claim requirement that rejects `offering`, if any.
    pub fn incompatibility(
        &self,
        claim: &[Requirement],
        offering: &Requirements,
    ) -> Option<Incompatibility> {
        claim.iter().find_map(|r| self.check(r, offering))
    }

    fn check(&self, requirement: &Requirement, offering: &Requirements) -> Option<Incompatibility> {
        let key = self.labels.normalize(&requirement.key);

        let Some(offered) = offering.value_set(key) else {
            if requirement.allows_absent() {
                return None;
            }
            if self.undefined == UndefinedLabelPolicy::DenyWellKnown
                && self.labels.is_well_known(key)
            {
                return Some(Incompatibility::Undefined {
                    key: key.to_string(),
                });
            }
            return None;
        };

        // Absent on both sides.
        if offered.is_absent() && requirement.allows_absent() {
            return None;
        }

        let common = requirement.value_set().intersect(&offered);
        if common.is_empty() {
            return Some(Incompatibility::Disjoint {
                key: key.to_string(),
            });
        }

        if let Some(min_values) = requirement.min_values {
            let available = common.len();
            if available < min_values {
                return Some(Incompatibility::TooFewValues {
                    key: key.to_string(),
                    available,
                    min_values,
                });
            }
        }

        None
    }

    /// Whether `offering` has an available variant compatible with the claim.
    ///
    /// A variant is checked against the offering's requirements narrowed by
    /// its own, so keys declared only on the base still count as defined.
    pub fn has_available_variant(&self, claim: &[Requirement], offering: &Offering) -> bool {
        offering
            .variants
            .iter()
            .filter(|v| v.available)
            .any(|v| {
                let mut merged = offering.requirements.clone();
                for requirement in v.requirements.iter() {
                    merged.insert(requirement.clone());
                }
                self.compatible(claim, &merged)
            })
    }

    /// Filters `offerings` down to those that can serve the claim.
    ///
    /// Order is preserved.
    pub fn eligible(
        &self,
        claim: &[Requirement],
        requests: &ResourceList,
        offerings: Vec<Offering>,
    ) -> Vec<Offering> {
        offerings
            .into_iter()
            .filter(|offering| {
                match self.incompatibility(claim, &offering.requirements) {
                    // Left to the variant stage, which sees the merged requirements.
                    Some(Incompatibility::Undefined { key })
                        if offering.variants.iter().any(|v| v.requirements.contains_key(&key)) => {}
                    Some(reason) => {
                        debug!(offering = %offering.name, %reason, "Offering rejected by requirements");
                        return false;
                    }
                    None => {}
                }
                if !self.has_available_variant(claim, offering) {
                    debug!(offering = %offering.name, "Offering has no available compatible variant");
                    return false;
                }
                let allocatable = offering.allocatable();
                let missing = fit::shortfall(requests, &allocatable);
                if !missing.is_empty() {
                    debug!(offering = %offering.name, ?missing, "Offering does not fit requests");
                    return false;
                }
                true
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LABEL_ARCH, LABEL_CAPACITY_TYPE, LABEL_INSTANCE_TYPE, LABEL_ZONE};
    use crate::resources::{CPU, MEMORY};
    use crate::{OfferingVariant, Operator, Quantity};
    use proptest::prelude::*;
    use rstest::rstest;

    fn offering(name: &str, cpu: i64, mem_gib: i64) -> Offering {
        Offering::new(
            name,
            ResourceList::new()
                .with(CPU, Quantity::from_units(cpu))
                .with(MEMORY, Quantity::from_gibibytes(mem_gib)),
        )
        .with_requirement(Requirement::in_values(LABEL_INSTANCE_TYPE, [name]))
        .with_requirement(Requirement::in_values(LABEL_ARCH, ["amd64"]))
    }

    fn offering_reqs() -> Requirements {
        offering("small", 2, 4).requirements
    }

    #[rstest]
    #[case::matching_in(Requirement::in_values(LABEL_INSTANCE_TYPE, ["small", "large"]), true)]
    #[case::disjoint_in(Requirement::in_values(LABEL_INSTANCE_TYPE, ["tiny"]), false)]
    #[case::not_in_other(Requirement::new(LABEL_ARCH, Operator::NotIn, ["arm64"]), true)]
    #[case::not_in_same(Requirement::new(LABEL_ARCH, Operator::NotIn, ["amd64"]), false)]
    #[case::exists(Requirement::exists(LABEL_ARCH), true)]
    #[case::does_not_exist_defined(Requirement::does_not_exist(LABEL_ARCH), false)]
    #[case::deprecated_alias(Requirement::in_values("beta.kubernetes.io/arch", ["amd64"]), true)]
    #[case::undefined_custom(Requirement::in_values("example.com/team", ["a"]), true)]
    #[case::undefined_not_in(Requirement::new(LABEL_ZONE, Operator::NotIn, ["a"]), true)]
    #[case::min_values_met(Requirement::exists(LABEL_ARCH).with_min_values(1), true)]
    #[case::min_values_unmet(
        Requirement::in_values(LABEL_INSTANCE_TYPE, ["small", "large"]).with_min_values(2),
        false
    )]
    fn test_compatible(#[case] requirement: Requirement, #[case] expected: bool) {
        let matcher = RequirementMatcher::default();
        assert_eq!(matcher.compatible(&[requirement], &offering_reqs()), expected);
    }

    #[test]
    fn test_undefined_well_known_policy() {
        let claim = [Requirement::in_values(LABEL_ZONE, ["zone-a"])];

        let permissive = RequirementMatcher::default();
        assert!(permissive.compatible(&claim, &offering_reqs()));

        let strict =
            RequirementMatcher::new(LabelConfig::default(), UndefinedLabelPolicy::DenyWellKnown);
        assert_eq!(
            strict.incompatibility(&claim, &offering_reqs()),
            Some(Incompatibility::Undefined {
                key: LABEL_ZONE.to_string()
            })
        );

        let custom = [Requirement::in_values("example.com/team", ["a"])];
        assert!(strict.compatible(&custom, &offering_reqs()));
    }

    #[test]
    fn test_absent_on_both_sides() {
        let offering = Requirements::new().with(Requirement::does_not_exist("example.com/gpu"));
        let matcher = RequirementMatcher::default();
        assert!(matcher.compatible(&[Requirement::does_not_exist("example.com/gpu")], &offering));
        assert!(matcher.compatible(
            &[Requirement::new("example.com/gpu", Operator::NotIn, ["a100"])],
            &offering
        ));
        assert!(!matcher.compatible(&[Requirement::exists("example.com/gpu")], &offering));
    }

    #[test]
    fn test_requirements_are_anded() {
        let matcher = RequirementMatcher::default();
        let claim = [
            Requirement::in_values(LABEL_INSTANCE_TYPE, ["small"]),
            Requirement::in_values(LABEL_ARCH, ["arm64"]),
        ];
        assert!(!matcher.compatible(&claim, &offering_reqs()));
        assert!(matcher.compatible(&claim[..1], &offering_reqs()));
    }

    #[test]
    fn test_gt_bound() {
        let offering = Requirements::new().with(Requirement::in_values("example.com/cpu", ["8"]));
        let matcher = RequirementMatcher::default();
        assert!(matcher.compatible(
            &[Requirement::new("example.com/cpu", Operator::Gt, ["4"])],
            &offering
        ));
        assert!(!matcher.compatible(
            &[Requirement::new("example.com/cpu", Operator::Lt, ["4"])],
            &offering
        ));
    }

    #[test]
    fn test_has_available_variant() {
        let matcher = RequirementMatcher::default();
        let spot_only = [Requirement::in_values(LABEL_CAPACITY_TYPE, ["spot"])];

        let available = offering("small", 2, 4);
        assert!(matcher.has_available_variant(&[], &available));
        assert!(!matcher.has_available_variant(&spot_only, &available));

        let unavailable = offering("small", 2, 4).with_variants(vec![OfferingVariant::on_demand(false)]);
        assert!(!matcher.has_available_variant(&[], &unavailable));
    }

    #[test]
    fn test_eligible_filters_and_preserves_order() {
        let matcher = RequirementMatcher::default();
        let catalog = vec![
            offering("tiny", 1, 2),
            offering("small", 2, 4),
            offering("large", 8, 32),
        ];
        let requests = ResourceList::new().with(CPU, Quantity::from_units(2));

        let names: Vec<String> = matcher
            .eligible(&[], &requests, catalog.clone())
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, ["small", "large"]);

        let claim = [Requirement::in_values(LABEL_INSTANCE_TYPE, ["small"])];
        let requests = ResourceList::new().with(CPU, Quantity::from_units(1));
        let eligible = matcher.eligible(&claim, &requests, catalog);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name, "small");
    }

    #[test]
    fn test_strict_policy_checks_variants_with_base_requirements() {
        let strict =
            RequirementMatcher::new(LabelConfig::default(), UndefinedLabelPolicy::DenyWellKnown);
        let requests = ResourceList::new().with(CPU, Quantity::from_units(1));
        let catalog = vec![offering("tiny", 1, 2), offering("small", 2, 4)];

        let pinned_type = [Requirement::in_values(LABEL_INSTANCE_TYPE, ["small"])];
        assert!(strict.has_available_variant(&pinned_type, &catalog[1]));
        let eligible = strict.eligible(&pinned_type, &requests, catalog.clone());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name, "small");

        // Capacity type is declared on the variant only.
        let pinned_capacity = [
            Requirement::in_values(LABEL_CAPACITY_TYPE, ["on-demand"]),
            Requirement::in_values(LABEL_ARCH, ["amd64"]),
        ];
        assert_eq!(strict.eligible(&pinned_capacity, &requests, catalog.clone()).len(), 2);

        let spot = [Requirement::in_values(LABEL_CAPACITY_TYPE, ["spot"])];
        assert!(strict.eligible(&spot, &requests, catalog).is_empty());
    }

    #[test]
    fn test_variant_narrows_base_requirement() {
        let matcher = RequirementMatcher::default();
        let offering = offering("small", 2, 4)
            .with_requirement(Requirement::in_values(LABEL_ZONE, ["zone-a", "zone-b"]))
            .with_variants(vec![OfferingVariant {
                requirements: Requirements::new()
                    .with(Requirement::in_values(LABEL_CAPACITY_TYPE, ["on-demand"]))
                    .with(Requirement::in_values(LABEL_ZONE, ["zone-a"])),
                available: true,
            }]);

        let zone_a = [Requirement::in_values(LABEL_ZONE, ["zone-a"])];
        let zone_b = [Requirement::in_values(LABEL_ZONE, ["zone-b"])];
        assert!(matcher.compatible(&zone_b, &offering.requirements));
        assert!(matcher.has_available_variant(&zone_a, &offering));
        assert!(!matcher.has_available_variant(&zone_b, &offering));
    }

    #[test]
    fn test_eligible_empty_when_nothing_fits() {
        let matcher = RequirementMatcher::default();
        let requests = ResourceList::new().with(CPU, Quantity::from_units(64));
        assert!(matcher
            .eligible(&[], &requests, vec![offering("tiny", 1, 2)])
            .is_empty());
    }

    fn values() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e"]), 0..5)
            .prop_map(|v| v.into_iter().map(String::from).collect())
    }

    proptest! {
        #[test]
        fn prop_widening_in_is_monotonic(offered in values(), narrow in values(), extra in values()) {
            let offering = Requirements::new().with(Requirement::in_values("k", offered));
            let matcher = RequirementMatcher::default();

            let narrow_req = Requirement::in_values("k", narrow.clone());
            let wide_req = Requirement::in_values("k", narrow.into_iter().chain(extra));

            if matcher.compatible(&[narrow_req], &offering) {
                prop_assert!(matcher.compatible(&[wide_req], &offering));
            }
        }

        #[test]
        fn prop_shrinking_not_in_is_monotonic(offered in values(), excluded in values(), keep in 0usize..5) {
            let offering = Requirements::new().with(Requirement::in_values("k", offered));
            let matcher = RequirementMatcher::default();

            let strict = Requirement::new("k", Operator::NotIn, excluded.clone());
            let relaxed = Requirement::new("k", Operator::NotIn, excluded.into_iter().take(keep));

            if matcher.compatible(&[strict], &offering) {
                prop_assert!(matcher.compatible(&[relaxed], &offering));
            }
        }
    }
}
