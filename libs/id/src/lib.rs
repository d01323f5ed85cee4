//! # stratus-id
//!
//! Provider identifier encoding and strict parsing.
//!
//! ## Design Principles
//!
//! - The provider identifier is the only durable link between a claim and
//!   the backend instance it owns
//! - There is exactly one canonical string form, and parsing accepts only it
//! - Identifiers roundtrip exactly (encode → parse → encode)
//!
//! ## Format
//!
//! ```text
//! openstack:///<instance-id>
//! ```
//!
//! The authority component is always empty and the path carries a single
//! segment: the backend instance id. The `openstack://<id>/<name>` variant
//! is rejected.

mod error;
mod types;

pub use error::IdError;
pub use types::*;
