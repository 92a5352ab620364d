//! Node Data Structures
//!
//! This module defines the core `Node` struct and related types for the
//! taxonomy graph.
//!
//! # Architecture
//!
//! - **Universal Node**: Single struct represents subjects, topics, resources and
//!   generic nodes. The `NodeType` tag carries the per-type capabilities.
//! - **Public identity**: Every node has a stable URN-like `PublicId`
//!   (`urn:subject:1`). Identity across namespaces is matched on this id only;
//!   the numeric `id` is assigned by the store per namespace.
//! - **Cached contexts**: `contexts` is derived state owned by the context
//!   updater. It is never authored directly.
//!
//! # Examples
//!
//! ```rust
//! use taxonomy_core::models::{Node, NodeType};
//!
//! let subject = Node::new(NodeType::Subject, "Mathematics");
//! assert!(subject.is_context);
//!
//! let topic = Node::new(NodeType::Topic, "Algebra");
//! assert!(!topic.is_context);
//! ```

use crate::models::context::{pick_context, TaxonomyContext};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Custom field deciding whether contexts through a node are active
pub const SUBJECT_CATEGORY_FIELD: &str = "subjectCategory";

/// Category values that keep a context active
pub const ACTIVE_CATEGORIES: &[&str] = &["active", "beta", "other_resources"];

/// Validation errors for Node operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid public id format: {0}")]
    InvalidId(String),
}

fn public_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^urn:[a-z][a-z0-9-]*:[A-Za-z0-9][A-Za-z0-9:._-]*$")
            .expect("public id pattern is a valid regex")
    })
}

/// Stable URN-like identifier (`urn:<kind>:<ident>`)
///
/// Used for nodes, connections and versions. Ordering is lexical, which keeps
/// iteration over id-keyed collections deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicId(String);

impl PublicId {
    /// Parse and validate a public id
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if public_id_pattern().is_match(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidId(value))
        }
    }

    /// Generate a fresh id of the given kind (`urn:<kind>:<uuid>`)
    pub fn generate(kind: &str) -> Self {
        Self(format!("urn:{}:{}", kind, Uuid::new_v4()))
    }

    /// Build an id from a kind and an identifier without a random component
    pub fn from_parts(kind: &str, ident: impl fmt::Display) -> Result<Self, ValidationError> {
        Self::parse(format!("urn:{}:{}", kind, ident))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `<kind>` segment (`subject` for `urn:subject:1`)
    pub fn kind(&self) -> &str {
        self.0
            .strip_prefix("urn:")
            .and_then(|rest| rest.split(':').next())
            .unwrap_or_default()
    }

    /// Path segment used when building context paths: `urn:subject:1` becomes `/subject:1`
    pub fn path_part(&self) -> String {
        let specific = self.0.strip_prefix("urn:").unwrap_or(&self.0);
        format!("/{}", specific)
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PublicId> for String {
    fn from(id: PublicId) -> Self {
        id.0
    }
}

impl AsRef<str> for PublicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type tag for taxonomy nodes
///
/// There is no subtyping: every node is a `Node`, and the behaviour that
/// differs between kinds is expressed through the capability methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Subject,
    Topic,
    Resource,
    Node,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Subject,
        NodeType::Topic,
        NodeType::Resource,
        NodeType::Node,
    ];

    /// Kind segment used in generated public ids
    pub fn url_prefix(&self) -> &'static str {
        match self {
            NodeType::Subject => "subject",
            NodeType::Topic => "topic",
            NodeType::Resource => "resource",
            NodeType::Node => "node",
        }
    }

    /// Subjects start their own context unless told otherwise
    pub fn default_is_context(&self) -> bool {
        matches!(self, NodeType::Subject)
    }

    /// Resources are leaves of the taxonomy
    pub fn can_have_children(&self) -> bool {
        !matches!(self, NodeType::Resource)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url_prefix())
    }
}

impl FromStr for NodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "subject" => Ok(NodeType::Subject),
            "topic" => Ok(NodeType::Topic),
            "resource" => Ok(NodeType::Resource),
            "node" => Ok(NodeType::Node),
            other => Err(ValidationError::InvalidNodeType(other.to_string())),
        }
    }
}

/// Taxonomy node: a subject, topic, resource or generic node.
///
/// # Fields
///
/// - `id`: Numeric id, assigned by the store when the node is first committed
///   to a namespace (0 until then)
/// - `public_id`: Stable identity shared by every namespace
/// - `translations`: Language code → translated name
/// - `custom_fields`: Free-form key/value metadata
/// - `grep_codes`: External classification codes
/// - `resource_types`: Ids of the resource types attached to the node
/// - `contexts`: Cached root-to-node paths (derived)
/// - `parent_connections` / `child_connections`: Ids of incident connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: i64,

    pub public_id: PublicId,

    pub node_type: NodeType,

    pub name: String,

    #[serde(default)]
    pub translations: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<String>,

    /// Whether this node starts a context (a path root) of its own
    pub is_context: bool,

    pub visible: bool,

    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,

    #[serde(default)]
    pub grep_codes: BTreeSet<String>,

    #[serde(default)]
    pub resource_types: BTreeSet<String>,

    /// Derived by the context updater; replaced wholesale on every recompute
    #[serde(default)]
    pub contexts: Vec<TaxonomyContext>,

    #[serde(default)]
    pub parent_connections: BTreeSet<PublicId>,

    #[serde(default)]
    pub child_connections: BTreeSet<PublicId>,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with a generated public id (`urn:<type>:<uuid>`)
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self::with_public_id(PublicId::generate(node_type.url_prefix()), node_type, name)
    }

    /// Create a new node with an explicit public id
    pub fn with_public_id(public_id: PublicId, node_type: NodeType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            public_id,
            node_type,
            name: name.into(),
            translations: BTreeMap::new(),
            content_uri: None,
            is_context: node_type.default_is_context(),
            visible: true,
            custom_fields: BTreeMap::new(),
            grep_codes: BTreeSet::new(),
            resource_types: BTreeSet::new(),
            contexts: Vec::new(),
            parent_connections: BTreeSet::new(),
            child_connections: BTreeSet::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        Ok(())
    }

    /// A node is a path root if it starts its own context or has no parents
    pub fn is_path_root(&self) -> bool {
        self.is_context || self.parent_connections.is_empty()
    }

    /// Whether contexts running through this node count as active
    pub fn is_active_category(&self) -> bool {
        let category = self
            .custom_fields
            .get(SUBJECT_CATEGORY_FIELD)
            .map(String::as_str)
            .unwrap_or("active");
        ACTIVE_CATEGORIES.contains(&category)
    }

    /// Name in the requested language, falling back to the default name
    pub fn translated_name(&self, language: &str) -> &str {
        self.translations
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// The primary context, if contexts have been computed
    pub fn primary_context(&self) -> Option<&TaxonomyContext> {
        self.contexts.iter().find(|context| context.is_primary)
    }

    /// Path of the primary context
    pub fn primary_path(&self) -> Option<&str> {
        self.primary_context().map(|context| context.path.as_str())
    }

    /// All cached paths in lexical order
    pub fn all_paths(&self) -> BTreeSet<String> {
        self.contexts.iter().map(|c| c.path.clone()).collect()
    }

    /// Pick one context; see [`pick_context`] for the selection order
    pub fn pick_context(
        &self,
        context_id: Option<&str>,
        parent: Option<&PublicId>,
        root: Option<&PublicId>,
    ) -> Option<&TaxonomyContext> {
        pick_context(&self.contexts, context_id, parent, root)
    }

    pub fn set_custom_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_fields.insert(key.into(), value.into());
        self.modified_at = Utc::now();
    }

    pub fn unset_custom_field(&mut self, key: &str) -> Option<String> {
        let removed = self.custom_fields.remove(key);
        if removed.is_some() {
            self.modified_at = Utc::now();
        }
        removed
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Parameters for creating a node
#[derive(Debug, Clone)]
pub struct NewNode {
    /// Explicit public id; generated from the node type when `None`
    pub public_id: Option<PublicId>,
    pub node_type: NodeType,
    pub name: String,
    pub content_uri: Option<String>,
    /// Overrides `NodeType::default_is_context` when set
    pub is_context: Option<bool>,
    pub visible: bool,
    pub translations: BTreeMap<String, String>,
    pub custom_fields: BTreeMap<String, String>,
    pub grep_codes: BTreeSet<String>,
    pub resource_types: BTreeSet<String>,
}

impl NewNode {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            public_id: None,
            node_type,
            name: name.into(),
            content_uri: None,
            is_context: None,
            visible: true,
            translations: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
            grep_codes: BTreeSet::new(),
            resource_types: BTreeSet::new(),
        }
    }

    pub fn with_public_id(mut self, public_id: PublicId) -> Self {
        self.public_id = Some(public_id);
        self
    }

    pub fn with_context(mut self, is_context: bool) -> Self {
        self.is_context = Some(is_context);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_content_uri(mut self, content_uri: impl Into<String>) -> Self {
        self.content_uri = Some(content_uri.into());
        self
    }

    pub fn with_translation(mut self, language: impl Into<String>, name: impl Into<String>) -> Self {
        self.translations.insert(language.into(), name.into());
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_grep_code(mut self, code: impl Into<String>) -> Self {
        self.grep_codes.insert(code.into());
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_types.insert(resource_type.into());
        self
    }

    /// Build the node this request describes
    pub fn into_node(self) -> Node {
        let public_id = self
            .public_id
            .unwrap_or_else(|| PublicId::generate(self.node_type.url_prefix()));
        let mut node = Node::with_public_id(public_id, self.node_type, self.name);
        node.content_uri = self.content_uri;
        if let Some(is_context) = self.is_context {
            node.is_context = is_context;
        }
        node.visible = self.visible;
        node.translations = self.translations;
        node.custom_fields = self.custom_fields;
        node.grep_codes = self.grep_codes;
        node.resource_types = self.resource_types;
        node
    }
}

/// Partial node update
///
/// All fields are optional; only provided fields are changed. `content_uri`
/// uses the double-Option pattern:
///
/// - `None`: Don't change
/// - `Some(None)`: Clear
/// - `Some(Some(uri))`: Set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_context: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    /// Replaces the whole translation map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<BTreeMap<String, String>>,

    /// Merged into the existing custom fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grep_codes: Option<BTreeSet<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<BTreeSet<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_context(mut self, is_context: bool) -> Self {
        self.is_context = Some(is_context);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content_uri.is_none()
            && self.is_context.is_none()
            && self.visible.is_none()
            && self.translations.is_none()
            && self.custom_fields.is_none()
            && self.grep_codes.is_none()
            && self.resource_types.is_none()
    }

    /// Whether applying this update can change the cached contexts
    pub fn affects_contexts(&self) -> bool {
        self.is_context.is_some()
            || self.visible.is_some()
            || self
                .custom_fields
                .as_ref()
                .is_some_and(|fields| fields.contains_key(SUBJECT_CATEGORY_FIELD))
    }

    /// Apply the update to a node in place
    pub fn apply_to(self, node: &mut Node) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(content_uri) = self.content_uri {
            node.content_uri = content_uri;
        }
        if let Some(is_context) = self.is_context {
            node.is_context = is_context;
        }
        if let Some(visible) = self.visible {
            node.visible = visible;
        }
        if let Some(translations) = self.translations {
            node.translations = translations;
        }
        if let Some(fields) = self.custom_fields {
            node.custom_fields.extend(fields);
        }
        if let Some(codes) = self.grep_codes {
            node.grep_codes = codes;
        }
        if let Some(types) = self.resource_types {
            node.resource_types = types;
        }
        node.touch();
    }
}

/// Result of a node delete
///
/// Deletes are idempotent: deleting a node that does not exist succeeds with
/// `existed == false`.
///
/// # Examples
///
/// ```rust
/// use taxonomy_core::models::DeleteResult;
///
/// let result = DeleteResult::not_found();
/// assert!(!result.existed);
/// assert_eq!(result.disconnected, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Whether the node existed before deletion
    pub existed: bool,
    /// Connections severed before the node was removed
    pub disconnected: usize,
}

impl DeleteResult {
    pub fn existed(disconnected: usize) -> Self {
        Self {
            existed: true,
            disconnected,
        }
    }

    pub fn not_found() -> Self {
        Self {
            existed: false,
            disconnected: 0,
        }
    }
}
