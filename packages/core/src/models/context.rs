//! Taxonomy Contexts
//!
//! A context is one root-to-node path through the connection graph, cached on
//! the node it ends at. Contexts are derived state: the context updater
//! replaces a node's whole set whenever its ancestry changes.
//!
//! # Context ids
//!
//! Context ids are short, stable digests so that the same path yields the same
//! id in every namespace:
//!
//! - Root context: first 8 hex chars of SHA-256 over the node's public id
//! - Extended context: first 12 hex chars of SHA-256 over the parent context
//!   id concatenated with the connection's public id

use crate::models::node::PublicId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const ROOT_CONTEXT_ID_LEN: usize = 8;
const EXTENDED_CONTEXT_ID_LEN: usize = 12;

fn short_hash(input: &str, len: usize) -> String {
    let mut hex = hex::encode(Sha256::digest(input.as_bytes()));
    hex.truncate(len);
    hex
}

/// Context id for a path that starts at `root`
pub fn root_context_id(root: &PublicId) -> String {
    short_hash(root.as_str(), ROOT_CONTEXT_ID_LEN)
}

/// Context id for the path that extends `parent_context_id` through `connection`
pub fn extended_context_id(parent_context_id: &str, connection: &PublicId) -> String {
    short_hash(
        &format!("{}{}", parent_context_id, connection.as_str()),
        EXTENDED_CONTEXT_ID_LEN,
    )
}

/// One cached root-to-node path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyContext {
    pub context_id: String,

    pub root_id: PublicId,

    /// Concatenated path parts, root first (`/subject:1/topic:1`)
    pub path: String,

    /// Ancestors between the root and the node, both excluded
    pub breadcrumbs: Vec<PublicId>,

    /// All ancestors root first, root included
    pub parent_ids: Vec<PublicId>,

    pub is_primary: bool,

    pub is_visible: bool,

    pub is_active: bool,

    pub relevance_id: String,

    /// Connection the path arrives through; `None` for a root context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<PublicId>,

    pub rank: i32,
}

impl TaxonomyContext {
    /// Number of path segments
    pub fn depth(&self) -> usize {
        self.path.split('/').filter(|part| !part.is_empty()).count()
    }

    pub fn is_root_context(&self) -> bool {
        self.connection_id.is_none()
    }
}

/// Pick one context out of `contexts`.
///
/// Selection order:
///
/// 1. The context whose id equals `context_id`
/// 2. A context rooted at `root` that has `parent` among its breadcrumbs.
///    The root itself is never a breadcrumb; `parent == root` falls through to 3
/// 3. Any context rooted at `root`
/// 4. The context with the fewest path segments, ties broken by lexical context id
///
/// Returns `None` only when `contexts` is empty.
pub fn pick_context<'a>(
    contexts: &'a [TaxonomyContext],
    context_id: Option<&str>,
    parent: Option<&PublicId>,
    root: Option<&PublicId>,
) -> Option<&'a TaxonomyContext> {
    if let Some(wanted) = context_id {
        if let Some(found) = contexts.iter().find(|c| c.context_id == wanted) {
            return Some(found);
        }
    }

    if let Some(root) = root {
        let rooted = || contexts.iter().filter(move |c| &c.root_id == root);

        if let Some(parent) = parent {
            if let Some(found) = rooted()
                .filter(|c| c.breadcrumbs.contains(parent))
                .min_by(|a, b| a.context_id.cmp(&b.context_id))
            {
                return Some(found);
            }
        }

        if let Some(found) = rooted().min_by(|a, b| a.context_id.cmp(&b.context_id)) {
            return Some(found);
        }
    }

    contexts
        .iter()
        .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.context_id.cmp(&b.context_id)))
}
