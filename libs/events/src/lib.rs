//! # stratus-events
//!
//! Operator-facing events emitted while reconciling claims.
//!
//! ## Design Principles
//!
//! - Events are a best-effort side channel; they never carry the primary
//!   failure (that is always a returned error)
//! - Every event names the object it is about, a stable machine-readable
//!   reason, and a human-readable message
//! - Sinks must be safe to share across concurrent reconciles
//!
//! ## Reasons
//!
//! Reasons are CamelCase constants in [`reasons`]:
//! - Claim launch outcomes (`Launched`, `InsufficientCapacity`, `InstanceLeaked`)
//! - Claim teardown (`Terminated`)
//! - Node class resolution (`NodeClassNotFound`)

mod sink;
mod types;

pub use sink::*;
pub use types::*;
