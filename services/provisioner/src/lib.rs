//! Stratus provisioner library.
//!
//! Turns capacity claims into OpenStack compute instances and keeps each
//! claim in step with its instance.
//!
//! ## Architecture
//!
//! ```text
//! CloudProvider (claim reconciler)
//! ├── NodeClassStore     (resolves the claim's node class)
//! ├── OfferingCatalog    (offerings for the class)
//! ├── RequirementMatcher (requirements → variants → fit)
//! ├── InstanceProvider   (sequential launch attempts, polling, cleanup)
//! │   └── ComputeBackend (Nova client, or the in-memory mock)
//! └── EventSink          (operator events)
//! ```
//!
//! ## Modules
//!
//! - `backend`: compute backend trait, Nova client and mock
//! - `catalog`: offering catalogs (static and flavor-derived)
//! - `class_store`: node class lookup
//! - `cloudprovider`: the claim reconciler
//! - `instance`: the instance lifecycle provider
//! - `model`: claims, node classes and instances

pub mod backend;
pub mod catalog;
pub mod class_store;
pub mod cloudprovider;
pub mod config;
pub mod error;
pub mod instance;
pub mod model;
pub mod status;

// Re-export commonly used types
pub use backend::{BackendError, ComputeBackend, MockBackend, NovaClient};
pub use catalog::{Flavor, FlavorCatalog, OfferingCatalog, StaticCatalog};
pub use class_store::{InMemoryNodeClassStore, NodeClassStore};
pub use cloudprovider::CloudProvider;
pub use error::{AttemptError, AttemptFailure, Cleanup, ProvisionError};
pub use instance::{InstanceProvider, InstanceSettings};
pub use model::{Claim, Instance, InstanceStatus, NodeClass};
