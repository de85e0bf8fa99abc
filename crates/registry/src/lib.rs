//! Thread-safe tables mapping small integer identifiers to shared objects.
//!
//! A registry runs in one of two modes, fixed at construction:
//! - [`AllocationMode::AutoIncrement`] hands out ids from a monotonic counter
//!   starting at 1. Ids are never reused, even after deletion.
//! - [`AllocationMode::ExplicitKey`] stores values under caller-supplied keys
//!   (for example raw window handles).
//!
//! Every method on [`IdRegistry`] is atomic on its own. Callers that need
//! several operations to observe a consistent table hold the guard returned
//! by [`IdRegistry::lock`].

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{AllocationMode, IdRegistry, RegistryGuard, RegistryKey};
