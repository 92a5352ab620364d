//! Database Error Types
//!
//! Errors raised by store implementations. They cross the `TaxonomyStore`
//! trait boundary wrapped in `anyhow::Error`; services map them to
//! `TaxonomyError::Storage`.

use crate::models::StoreScope;
use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The requested storage scope has not been created
    #[error("Storage scope '{scope}' does not exist")]
    ScopeNotFound { scope: StoreScope },

    /// A scope with this key already exists
    #[error("Storage scope '{scope}' already exists")]
    ScopeExists { scope: StoreScope },

    /// The default scope is permanent
    #[error("The default storage scope cannot be dropped")]
    DefaultScopeImmutable,

    /// A write referenced an entity that is not stored
    #[error("Missing {entity} '{id}' in scope '{scope}'")]
    MissingEntity {
        entity: &'static str,
        id: String,
        scope: StoreScope,
    },

    /// A change set would leave the scope inconsistent
    #[error("Change set rejected: {context}")]
    ChangeSetRejected { context: String },
}

impl DatabaseError {
    pub fn scope_not_found(scope: &StoreScope) -> Self {
        Self::ScopeNotFound {
            scope: scope.clone(),
        }
    }

    pub fn scope_exists(scope: &StoreScope) -> Self {
        Self::ScopeExists {
            scope: scope.clone(),
        }
    }

    pub fn missing_entity(entity: &'static str, id: impl Into<String>, scope: &StoreScope) -> Self {
        Self::MissingEntity {
            entity,
            id: id.into(),
            scope: scope.clone(),
        }
    }

    pub fn change_set_rejected(context: impl Into<String>) -> Self {
        Self::ChangeSetRejected {
            context: context.into(),
        }
    }
}
