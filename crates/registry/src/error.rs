//! Error types for id registries.

use crate::AllocationMode;

/// Errors produced by an [`IdRegistry`](crate::IdRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{operation} is not supported by a registry in {mode:?} mode")]
    WrongMode {
        operation: &'static str,
        mode: AllocationMode,
    },

    #[error("key {0} is already registered")]
    Occupied(String),

    #[error("key {0} not found")]
    NotFound(String),

    #[error("identifier space exhausted")]
    Exhausted,
}
