//! Service Layer Error Types
//!
//! Every taxonomy rule violation surfaces as a typed `TaxonomyError` that
//! carries the offending ids. Callers that only need the broad category
//! match on [`TaxonomyError::kind`].

use crate::db::DatabaseError;
use crate::models::{PublicId, ValidationError};
use crate::operations::OperationError;
use thiserror::Error;

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced entity is absent
    NotFound,
    /// Self-loop, would-be cycle, malformed id or forbidden state change
    InvalidArgument,
    /// The parent→child edge already exists
    DuplicateConnection,
    /// The stored graph is corrupt (cycle or runaway depth found while traversing)
    DataIntegrity,
    /// The store failed
    Storage,
}

/// Service operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaxonomyError {
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Version not found: {id}")]
    VersionNotFound { id: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Request rejected by a taxonomy rule
    #[error("Invalid argument: {reason} ({})", ids.join(", "))]
    InvalidArgument { reason: String, ids: Vec<String> },

    #[error("Cannot connect node '{node_id}' to itself")]
    SelfConnection { node_id: String },

    /// The parent is reachable from the child, so the edge would close a cycle
    #[error("Connecting '{parent_id}' -> '{child_id}' would create a cycle")]
    WouldCreateCycle { parent_id: String, child_id: String },

    #[error("Connection '{parent_id}' -> '{child_id}' already exists")]
    DuplicateConnection { parent_id: String, child_id: String },

    /// Found a cycle while traversing committed data
    #[error("Cycle detected at '{node_id}' (path: {})", path.join(" -> "))]
    CycleDetected { node_id: String, path: Vec<String> },

    #[error("Recursion limit of {limit} reached at '{node_id}'")]
    RecursionLimit { node_id: String, limit: usize },

    #[error("Storage operation failed: {0}")]
    Storage(String),
}

impl TaxonomyError {
    pub fn node_not_found(id: impl ToString) -> Self {
        Self::NodeNotFound { id: id.to_string() }
    }

    pub fn connection_not_found(id: impl ToString) -> Self {
        Self::ConnectionNotFound { id: id.to_string() }
    }

    pub fn version_not_found(id: impl ToString) -> Self {
        Self::VersionNotFound { id: id.to_string() }
    }

    pub fn invalid_argument(reason: impl Into<String>, ids: &[&PublicId]) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
            ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn self_connection(node_id: &PublicId) -> Self {
        Self::SelfConnection {
            node_id: node_id.to_string(),
        }
    }

    pub fn would_create_cycle(parent_id: &PublicId, child_id: &PublicId) -> Self {
        Self::WouldCreateCycle {
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
        }
    }

    pub fn duplicate_connection(parent_id: &PublicId, child_id: &PublicId) -> Self {
        Self::DuplicateConnection {
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
        }
    }

    pub fn cycle_detected(node_id: &PublicId, path: &[PublicId]) -> Self {
        Self::CycleDetected {
            node_id: node_id.to_string(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn recursion_limit(node_id: &PublicId, limit: usize) -> Self {
        Self::RecursionLimit {
            node_id: node_id.to_string(),
            limit,
        }
    }

    /// Wrap a store failure
    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound { .. }
            | Self::ConnectionNotFound { .. }
            | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::ValidationFailed(_)
            | Self::InvalidArgument { .. }
            | Self::SelfConnection { .. }
            | Self::WouldCreateCycle { .. } => ErrorKind::InvalidArgument,
            Self::DuplicateConnection { .. } => ErrorKind::DuplicateConnection,
            Self::CycleDetected { .. } | Self::RecursionLimit { .. } => ErrorKind::DataIntegrity,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Integrity failures mean the graph must be repaired; retrying cannot help
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::DataIntegrity
    }

    /// Ids of the entities involved in the failure
    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::NodeNotFound { id }
            | Self::ConnectionNotFound { id }
            | Self::VersionNotFound { id } => vec![id.clone()],
            Self::ValidationFailed(ValidationError::InvalidId(id)) => vec![id.clone()],
            Self::ValidationFailed(_) | Self::Storage(_) => Vec::new(),
            Self::InvalidArgument { ids, .. } => ids.clone(),
            Self::SelfConnection { node_id } => vec![node_id.clone()],
            Self::WouldCreateCycle {
                parent_id,
                child_id,
            }
            | Self::DuplicateConnection {
                parent_id,
                child_id,
            } => vec![parent_id.clone(), child_id.clone()],
            Self::CycleDetected { path, .. } => path.clone(),
            Self::RecursionLimit { node_id, .. } => vec![node_id.clone()],
        }
    }
}

impl From<DatabaseError> for TaxonomyError {
    fn from(err: DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<OperationError> for TaxonomyError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::CycleDetected { node_id, path } => Self::CycleDetected { node_id, path },
            OperationError::Unreachable { ids } => Self::CycleDetected {
                node_id: ids.first().cloned().unwrap_or_default(),
                path: ids,
            },
        }
    }
}

/// Service result alias
pub type TaxonomyResult<T> = Result<T, TaxonomyError>;
