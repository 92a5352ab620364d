//! Error types for the pure graph operations
//!
//! The ranking and sorting algorithms do no I/O, so the only thing that can go
//! wrong is structurally invalid input: a cyclic parent chain.

use thiserror::Error;

/// Errors raised by the pure graph algorithms
///
/// # Examples
///
/// ```rust
/// use taxonomy_core::operations::OperationError;
///
/// let err = OperationError::CycleDetected {
///     node_id: "urn:topic:1".to_string(),
///     path: vec!["urn:subject:1".to_string(), "urn:topic:1".to_string()],
/// };
/// assert!(err.to_string().contains("urn:topic:1"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// An element was reached again below itself
    #[error("Cycle detected at '{node_id}' (path: {})", path.join(" -> "))]
    CycleDetected { node_id: String, path: Vec<String> },

    /// Elements whose parent chain never reaches a root
    #[error("Elements unreachable from any root: {}", ids.join(", "))]
    Unreachable { ids: Vec<String> },
}
