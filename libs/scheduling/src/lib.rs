//! Capacity matching: which offerings can serve a claim.
//!
//! This crate is pure: every function is a deterministic function of its
//! inputs, performs no I/O, and never errors at match time (parse errors are
//! surfaced when quantities and requirements are built).
//!
//! # Components
//!
//! - **`quantity`**: Exact resource quantities in Kubernetes notation
//! - **`resources`**: Named resource lists (capacity, overhead, requests)
//! - **`labels`**: Well-known label keys and alias normalization
//! - **`requirements`**: Requirement operators and value-set algebra
//! - **`offering`**: Offerings and their capacity-type variants
//! - **`matcher`**: RequirementMatcher (compatibility and eligibility)
//! - **`fit`**: ResourceFitChecker

pub mod fit;
pub mod labels;
pub mod matcher;
pub mod offering;
pub mod quantity;
pub mod requirements;
pub mod resources;

pub use fit::{fits, shortfall};
pub use labels::{LabelConfig, LabelOverrides};
pub use matcher::{Incompatibility, RequirementMatcher, UndefinedLabelPolicy};
pub use offering::{Offering, OfferingVariant};
pub use quantity::{Quantity, QuantityError};
pub use requirements::{Operator, Requirement, Requirements};
pub use resources::ResourceList;
