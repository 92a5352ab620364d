//! Engine configuration
//!
//! Plain structs with `Default`; the publishing knobs can also be read from the
//! environment with [`PublishConfig::from_env`].

use crate::models::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum path depth accepted by context and tree traversals
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 1000;

/// Custom fields that mark publishing state and are never copied between namespaces
pub const PUBLISHING_MARKER_FIELDS: &[&str] = &["isPublishing", "isChanged", "requestPublish"];

pub const ENV_PUBLISH_WORKERS: &str = "TAXONOMY_PUBLISH_WORKERS";
pub const ENV_PUBLISH_MAX_RETRIES: &str = "TAXONOMY_PUBLISH_MAX_RETRIES";
pub const ENV_PUBLISH_BACKOFF_MS: &str = "TAXONOMY_PUBLISH_BACKOFF_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyConfig {
    /// Depth bound for context recomputation and tree walks (default: 1000)
    pub max_traversal_depth: usize,
    pub publish: PublishConfig,
    pub merge: MergePolicy,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            publish: PublishConfig::default(),
            merge: MergePolicy::default(),
        }
    }
}

impl TaxonomyConfig {
    /// Defaults with the publishing section read from the environment
    pub fn from_env() -> Self {
        Self {
            publish: PublishConfig::from_env(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Concurrent changelog workers (default: 4)
    pub worker_count: usize,
    /// Failed attempts before an entry is dead-lettered (default: 3)
    pub max_retries: u32,
    /// Base delay for exponential retry backoff (default: 10ms)
    pub retry_backoff_ms: u64,
    /// Capacity of the dispatcher queue (default: 1024)
    pub channel_capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_retries: 3,
            retry_backoff_ms: 10,
            channel_capacity: 1024,
        }
    }
}

impl PublishConfig {
    /// Defaults overridden by `TAXONOMY_PUBLISH_*` variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_value::<usize>(ENV_PUBLISH_WORKERS) {
            config.worker_count = workers.max(1);
        }
        if let Some(retries) = env_value::<u32>(ENV_PUBLISH_MAX_RETRIES) {
            config.max_retries = retries;
        }
        if let Some(backoff) = env_value::<u64>(ENV_PUBLISH_BACKOFF_MS) {
            config.retry_backoff_ms = backoff;
        }
        config
    }

    /// Delay before retry number `attempt` (1-based): `retry_backoff_ms * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        std::time::Duration::from_millis(self.retry_backoff_ms.saturating_mul(1u64 << exponent))
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

/// Field groups copied when a node is republished
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldGroup {
    Name,
    ContentUri,
    /// `is_context` and `visible`
    Flags,
    Translations,
    CustomFields,
    GrepCodes,
    ResourceTypes,
}

/// How a field group of an existing target node is updated from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeRule {
    /// Overwrite with the source value
    Replace,
    /// Union of target and source; source wins on key conflicts. Scalars replace.
    Merge,
    /// Leave the target value alone
    Keep,
}

/// Per field group republish rules
///
/// New target nodes always take every field from the source. The rules only
/// apply when the node already exists in the target namespace. Every group
/// defaults to `Replace`; `Merge` and `Keep` are opt-in per group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicy {
    pub rules: BTreeMap<FieldGroup, MergeRule>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        let rules = BTreeMap::from([
            (FieldGroup::Name, MergeRule::Replace),
            (FieldGroup::ContentUri, MergeRule::Replace),
            (FieldGroup::Flags, MergeRule::Replace),
            (FieldGroup::Translations, MergeRule::Replace),
            (FieldGroup::CustomFields, MergeRule::Replace),
            (FieldGroup::GrepCodes, MergeRule::Replace),
            (FieldGroup::ResourceTypes, MergeRule::Replace),
        ]);
        Self { rules }
    }
}

impl MergePolicy {
    pub fn rule(&self, group: FieldGroup) -> MergeRule {
        self.rules.get(&group).copied().unwrap_or(MergeRule::Replace)
    }

    pub fn with_rule(mut self, group: FieldGroup, rule: MergeRule) -> Self {
        self.rules.insert(group, rule);
        self
    }

    /// Build the node to store in the target namespace.
    ///
    /// Identity, numeric id, connection indexes and contexts of `target` are
    /// preserved; publishing marker fields are stripped from the result.
    pub fn merge(&self, source: &Node, target: Option<&Node>) -> Node {
        let mut merged = match target {
            None => {
                let mut fresh = source.clone();
                fresh.id = 0;
                fresh.contexts.clear();
                fresh.parent_connections.clear();
                fresh.child_connections.clear();
                fresh
            }
            Some(existing) => {
                let mut merged = existing.clone();
                merged.node_type = source.node_type;

                if self.rule(FieldGroup::Name) != MergeRule::Keep {
                    merged.name = source.name.clone();
                }
                if self.rule(FieldGroup::ContentUri) != MergeRule::Keep {
                    merged.content_uri = source.content_uri.clone();
                }
                if self.rule(FieldGroup::Flags) != MergeRule::Keep {
                    merged.is_context = source.is_context;
                    merged.visible = source.visible;
                }
                match self.rule(FieldGroup::Translations) {
                    MergeRule::Replace => merged.translations = source.translations.clone(),
                    MergeRule::Merge => merged.translations.extend(source.translations.clone()),
                    MergeRule::Keep => {}
                }
                match self.rule(FieldGroup::CustomFields) {
                    MergeRule::Replace => merged.custom_fields = source.custom_fields.clone(),
                    MergeRule::Merge => merged.custom_fields.extend(source.custom_fields.clone()),
                    MergeRule::Keep => {}
                }
                match self.rule(FieldGroup::GrepCodes) {
                    MergeRule::Replace => merged.grep_codes = source.grep_codes.clone(),
                    MergeRule::Merge => merged.grep_codes.extend(source.grep_codes.iter().cloned()),
                    MergeRule::Keep => {}
                }
                match self.rule(FieldGroup::ResourceTypes) {
                    MergeRule::Replace => merged.resource_types = source.resource_types.clone(),
                    MergeRule::Merge => merged
                        .resource_types
                        .extend(source.resource_types.iter().cloned()),
                    MergeRule::Keep => {}
                }
                merged.modified_at = source.modified_at;
                merged
            }
        };

        for marker in PUBLISHING_MARKER_FIELDS {
            merged.custom_fields.remove(*marker);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::NodeType;

    #[test]
    fn test_default_config() {
        let config = TaxonomyConfig::default();
        assert_eq!(config.max_traversal_depth, 1000);
        assert_eq!(config.publish.worker_count, 4);
        assert_eq!(config.publish.max_retries, 3);
        assert_eq!(config.merge.rule(FieldGroup::Translations), MergeRule::Replace);
        assert_eq!(config.merge.rule(FieldGroup::GrepCodes), MergeRule::Replace);
        assert_eq!(config.merge.rule(FieldGroup::CustomFields), MergeRule::Replace);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = PublishConfig {
            retry_backoff_ms: 10,
            ..PublishConfig::default()
        };
        assert_eq!(config.backoff_for(1).as_millis(), 10);
        assert_eq!(config.backoff_for(2).as_millis(), 20);
        assert_eq!(config.backoff_for(4).as_millis(), 80);
    }

    #[test]
    fn test_merge_new_node_strips_markers() {
        let mut source = Node::new(NodeType::Topic, "Algebra");
        source.id = 42;
        source.set_custom_field("isPublishing", "true");
        source.set_custom_field("topic-reference", "x");

        let merged = MergePolicy::default().merge(&source, None);
        assert_eq!(merged.id, 0);
        assert!(!merged.custom_fields.contains_key("isPublishing"));
        assert!(merged.custom_fields.contains_key("topic-reference"));
    }

    #[test]
    fn test_merge_existing_node_follows_rules() {
        let mut source = Node::new(NodeType::Topic, "Algebra 2");
        source.translations.insert("nb".into(), "Algebra 2".into());
        source.grep_codes.insert("KM2".into());
        source.set_custom_field("b", "source");

        let mut target = source.clone();
        target.id = 7;
        target.name = "Algebra".into();
        target.translations.clear();
        target.translations.insert("nn".into(), "Algebra".into());
        target.grep_codes.clear();
        target.grep_codes.insert("KM1".into());
        target.custom_fields.clear();
        target.set_custom_field("a", "target");
        target.set_custom_field("requestPublish", "true");

        let merged = MergePolicy::default().merge(&source, Some(&target));
        assert_eq!(merged.id, 7);
        assert_eq!(merged.name, "Algebra 2");
        assert_eq!(merged.translations.len(), 1);
        assert!(merged.translations.contains_key("nb"));
        // Removed upstream, removed here
        assert_eq!(merged.grep_codes.iter().collect::<Vec<_>>(), vec!["KM2"]);
        assert!(!merged.custom_fields.contains_key("a"));
        assert_eq!(merged.custom_fields.get("b").map(String::as_str), Some("source"));
        assert!(!merged.custom_fields.contains_key("requestPublish"));

        let policy = MergePolicy::default()
            .with_rule(FieldGroup::Name, MergeRule::Keep)
            .with_rule(FieldGroup::GrepCodes, MergeRule::Merge)
            .with_rule(FieldGroup::CustomFields, MergeRule::Merge);
        let merged = policy.merge(&source, Some(&target));

        assert_eq!(merged.name, "Algebra");
        assert_eq!(merged.grep_codes.len(), 2);
        assert_eq!(merged.custom_fields.get("a").map(String::as_str), Some("target"));
        assert_eq!(merged.custom_fields.get("b").map(String::as_str), Some("source"));
        assert!(!merged.custom_fields.contains_key("requestPublish"));
    }
}
