//! Versions and storage scopes
//!
//! A version owns an isolated copy of the taxonomy graph. The copy lives in the
//! storage scope keyed by the version's hash; the live graph is the default
//! scope.

use crate::models::node::PublicId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Storage partition a store call targets
///
/// Passed explicitly to every store operation; there is no ambient "current
/// namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreScope {
    /// The live, editable graph
    Default,
    /// A version namespace keyed by the version hash
    Version(String),
}

impl StoreScope {
    /// Scope of the version with the given hash
    pub fn from_hash(hash: impl Into<String>) -> Self {
        StoreScope::Version(hash.into())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, StoreScope::Default)
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreScope::Default => f.write_str("default"),
            StoreScope::Version(hash) => write!(f, "version_{}", hash),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionType {
    Beta,
    Published,
    Archived,
}

/// A named snapshot namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: i64,
    pub public_id: PublicId,
    pub name: String,
    pub version_type: VersionType,
    /// Storage scope key
    pub hash: String,
    /// Locked versions accept no further publishing
    pub locked: bool,
    pub created: DateTime<Utc>,
    pub published: Option<DateTime<Utc>>,
    pub archived: Option<DateTime<Utc>>,
}

impl Version {
    /// New BETA version with a random 8 hex char hash
    pub fn new(name: impl Into<String>, public_id: Option<PublicId>) -> Self {
        let hash = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id: 0,
            public_id: public_id.unwrap_or_else(|| PublicId::generate("version")),
            name: name.into(),
            version_type: VersionType::Beta,
            hash,
            locked: false,
            created: Utc::now(),
            published: None,
            archived: None,
        }
    }

    pub fn scope(&self) -> StoreScope {
        StoreScope::from_hash(self.hash.clone())
    }

    pub fn mark_published(&mut self) {
        self.version_type = VersionType::Published;
        self.locked = true;
        self.published = Some(Utc::now());
    }

    pub fn mark_archived(&mut self) {
        self.version_type = VersionType::Archived;
        self.archived = Some(Utc::now());
    }
}
