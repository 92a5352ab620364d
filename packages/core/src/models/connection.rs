//! Parent/child connections between taxonomy nodes.

use crate::models::node::PublicId;
use crate::operations::rank_updater::Rankable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind segment of connection public ids
pub const CONNECTION_KIND: &str = "node-connection";

/// How central a child is to its parent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relevance {
    #[default]
    Core,
    Supplementary,
}

impl Relevance {
    /// URN reported in contexts (`urn:relevance:core`)
    pub fn public_id(&self) -> &'static str {
        match self {
            Relevance::Core => "urn:relevance:core",
            Relevance::Supplementary => "urn:relevance:supplementary",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_id())
    }
}

impl FromStr for Relevance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urn:relevance:core" | "core" | "CORE" => Ok(Relevance::Core),
            "urn:relevance:supplementary" | "supplementary" | "SUPPLEMENTARY" => {
                Ok(Relevance::Supplementary)
            }
            other => Err(format!("unknown relevance: {}", other)),
        }
    }
}

/// Directed, ranked edge from a parent node to a child node
///
/// `rank` is unique among connections sharing the same parent and contiguous
/// from 1. Exactly one of a child's parent connections is `primary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub public_id: PublicId,
    pub parent_id: PublicId,
    pub child_id: PublicId,
    pub relevance: Relevance,
    pub rank: i32,
    pub primary: bool,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(parent_id: PublicId, child_id: PublicId, relevance: Relevance) -> Self {
        Self {
            public_id: PublicId::generate(CONNECTION_KIND),
            parent_id,
            child_id,
            relevance,
            rank: 0,
            primary: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_public_id(mut self, public_id: PublicId) -> Self {
        self.public_id = public_id;
        self
    }

    pub fn connects(&self, parent_id: &PublicId, child_id: &PublicId) -> bool {
        &self.parent_id == parent_id && &self.child_id == child_id
    }
}

impl Rankable for Connection {
    fn rank_id(&self) -> &PublicId {
        &self.public_id
    }

    fn rank(&self) -> i32 {
        self.rank
    }
}

/// Partial connection update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub relevance: Option<Relevance>,
    pub rank: Option<i32>,
    pub primary: Option<bool>,
}

impl ConnectionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relevance(mut self, relevance: Relevance) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.relevance.is_none() && self.rank.is_none() && self.primary.is_none()
    }
}
