//! Tree Listing Tests
//!
//! Integration tests for recursive subtree listing.
//!
//! ## Key Concepts
//! - The walk emits one element per (node, path): a node shared by two parents
//!   appears twice
//! - The sorted listing is pre-order with siblings by rank
//! - Type filters restrict which children the walk follows

#[cfg(test)]
mod tree_listing_tests {
    use anyhow::Result;
    use std::sync::Arc;
    use taxonomy_core::db::MemoryStore;
    use taxonomy_core::models::{NewNode, NodeType, PublicId, Relevance, StoreScope, TaxonomyConfig};
    use taxonomy_core::services::{TaxonomyError, TaxonomyServices};

    fn id(value: &str) -> PublicId {
        PublicId::parse(value).unwrap()
    }

    /// Helper to build `subject:1 -> topic:1, topic:2; both topics -> resource:1`
    async fn create_shared_tree() -> Result<TaxonomyServices> {
        taxonomy_core::init_tracing();
        let services = TaxonomyServices::new(Arc::new(MemoryStore::new()), TaxonomyConfig::default());
        let scope = StoreScope::Default;
        for (public_id, node_type) in [
            ("urn:subject:1", NodeType::Subject),
            ("urn:topic:1", NodeType::Topic),
            ("urn:topic:2", NodeType::Topic),
            ("urn:resource:1", NodeType::Resource),
            ("urn:resource:2", NodeType::Resource),
        ] {
            services
                .nodes
                .create_node(&scope, NewNode::new(node_type, public_id).with_public_id(id(public_id)))
                .await?;
        }
        for (parent, child, rank) in [
            ("urn:subject:1", "urn:topic:2", None),
            ("urn:subject:1", "urn:topic:1", Some(1)),
            ("urn:topic:1", "urn:resource:1", None),
            ("urn:topic:2", "urn:resource:2", None),
            ("urn:topic:2", "urn:resource:1", Some(1)),
        ] {
            services
                .connections
                .connect_parent_child(&scope, &id(parent), &id(child), Relevance::Core, rank, None)
                .await?;
        }
        Ok(services)
    }

    #[tokio::test]
    async fn test_recursive_listing_has_one_entry_per_path() -> Result<()> {
        let services = create_shared_tree().await?;
        let elements = services
            .trees
            .get_recursive_nodes(&StoreScope::Default, &id("urn:subject:1"))
            .await?;

        assert_eq!(elements.len(), 6);
        assert_eq!(
            elements.iter().filter(|e| e.id == id("urn:resource:1")).count(),
            2
        );
        assert_eq!(elements[0].id, id("urn:subject:1"));
        assert!(elements[0].parent_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sorted_tree_is_preorder_by_rank() -> Result<()> {
        let services = create_shared_tree().await?;
        let entries = services
            .nodes
            .get_sorted_tree(&StoreScope::Default, &id("urn:subject:1"))
            .await?;

        let order: Vec<(String, Option<String>)> = entries
            .iter()
            .map(|e| (e.node.public_id.to_string(), e.parent_id.as_ref().map(ToString::to_string)))
            .collect();
        assert_eq!(
            order,
            vec![
                ("urn:subject:1".to_string(), None),
                ("urn:topic:1".to_string(), Some("urn:subject:1".to_string())),
                ("urn:resource:1".to_string(), Some("urn:topic:1".to_string())),
                ("urn:topic:2".to_string(), Some("urn:subject:1".to_string())),
                ("urn:resource:1".to_string(), Some("urn:topic:2".to_string())),
                ("urn:resource:2".to_string(), Some("urn:topic:2".to_string())),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_type_filter() -> Result<()> {
        let services = create_shared_tree().await?;
        let elements = services
            .trees
            .get_recursive_nodes_of_types(
                &StoreScope::Default,
                &id("urn:subject:1"),
                &[NodeType::Topic],
            )
            .await?;

        // Root plus both topics; resources are never followed
        assert_eq!(elements.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_subtree_of_inner_node() -> Result<()> {
        let services = create_shared_tree().await?;
        let elements = services
            .trees
            .get_sorted_tree(&StoreScope::Default, &id("urn:topic:2"))
            .await?;

        let ids: Vec<String> = elements.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, vec!["urn:topic:2", "urn:resource:1", "urn:resource:2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_root_is_not_found() -> Result<()> {
        let services = create_shared_tree().await?;
        let result = services
            .trees
            .get_recursive_nodes(&StoreScope::Default, &id("urn:subject:404"))
            .await;
        assert!(matches!(result, Err(TaxonomyError::NodeNotFound { .. })));
        Ok(())
    }
}
