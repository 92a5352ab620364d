//! Connection Invariant Tests
//!
//! Integration tests for the graph rules enforced by `ConnectionService`.
//!
//! ## Invariants
//! - Sibling ranks under one parent are unique and contiguous from 1
//! - A node with parents has exactly one primary parent connection
//! - The graph stays acyclic (self-loops included)
//! - An edge exists at most once per (parent, child)
//!
//! Every test drives the public service API and then inspects the committed
//! state through the store, so rejected mutations must leave no trace.

#[cfg(test)]
mod connection_invariant_tests {
    use anyhow::Result;
    use std::sync::Arc;
    use taxonomy_core::db::MemoryStore;
    use taxonomy_core::models::{
        ConnectionUpdate, NewNode, Node, NodeType, PublicId, Relevance, StoreScope, TaxonomyConfig,
    };
    use taxonomy_core::services::{ErrorKind, TaxonomyError, TaxonomyServices};

    const SCOPE: StoreScope = StoreScope::Default;

    fn id(value: &str) -> PublicId {
        PublicId::parse(value).unwrap()
    }

    /// Helper to create services over a fresh in-memory store
    fn create_services() -> TaxonomyServices {
        taxonomy_core::init_tracing();
        TaxonomyServices::new(Arc::new(MemoryStore::new()), TaxonomyConfig::default())
    }

    async fn create_node(services: &TaxonomyServices, public_id: &str, node_type: NodeType) -> Result<Node> {
        let request = NewNode::new(node_type, public_id).with_public_id(id(public_id));
        Ok(services.nodes.create_node(&SCOPE, request).await?)
    }

    async fn connect(services: &TaxonomyServices, parent: &str, child: &str) -> Result<PublicId> {
        let connection = services
            .connections
            .connect_parent_child(&SCOPE, &id(parent), &id(child), Relevance::Core, None, None)
            .await?;
        Ok(connection.public_id)
    }

    /// (child, rank) pairs under `parent` in rank order
    async fn child_ranks(services: &TaxonomyServices, parent: &str) -> Result<Vec<(String, i32)>> {
        let children = services
            .connections
            .get_child_connections(&SCOPE, &id(parent))
            .await?;
        Ok(children
            .into_iter()
            .map(|c| (c.child_id.to_string(), c.rank))
            .collect())
    }

    async fn assert_contiguous(services: &TaxonomyServices, parent: &str) -> Result<()> {
        let ranks: Vec<i32> = child_ranks(services, parent)
            .await?
            .into_iter()
            .map(|(_, rank)| rank)
            .collect();
        let expected: Vec<i32> = (1..=ranks.len() as i32).collect();
        assert_eq!(ranks, expected, "ranks under {} are not contiguous", parent);
        Ok(())
    }

    async fn primary_count(services: &TaxonomyServices, child: &str) -> Result<usize> {
        let parents = services
            .connections
            .get_parent_connections(&SCOPE, &id(child))
            .await?;
        Ok(parents.iter().filter(|c| c.primary).count())
    }

    // ========================================================================
    // Ranking
    // ========================================================================

    #[tokio::test]
    async fn test_insert_at_rank_two_shifts_followers() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        for n in 1..=4 {
            create_node(&services, &format!("urn:topic:{}", n), NodeType::Topic).await?;
        }
        for n in 1..=3 {
            connect(&services, "urn:subject:1", &format!("urn:topic:{}", n)).await?;
        }

        services
            .connections
            .connect_parent_child(
                &SCOPE,
                &id("urn:subject:1"),
                &id("urn:topic:4"),
                Relevance::Core,
                Some(2),
                None,
            )
            .await?;

        assert_eq!(
            child_ranks(&services, "urn:subject:1").await?,
            vec![
                ("urn:topic:1".to_string(), 1),
                ("urn:topic:4".to_string(), 2),
                ("urn:topic:2".to_string(), 3),
                ("urn:topic:3".to_string(), 4),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_ranks_stay_contiguous_through_mixed_operations() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        let mut connections = Vec::new();
        for n in 1..=5 {
            let topic = format!("urn:topic:{}", n);
            create_node(&services, &topic, NodeType::Topic).await?;
            connections.push(connect(&services, "urn:subject:1", &topic).await?);
        }

        // Move last to front
        services
            .connections
            .update_parent_child(&SCOPE, &connections[4], ConnectionUpdate::new().with_rank(1))
            .await?;
        assert_contiguous(&services, "urn:subject:1").await?;

        // Remove one from the middle
        services
            .connections
            .disconnect_parent_child(&SCOPE, &connections[2])
            .await?;
        assert_contiguous(&services, "urn:subject:1").await?;

        // Rank far beyond the end clamps to the last position
        services
            .connections
            .update_parent_child(&SCOPE, &connections[0], ConnectionUpdate::new().with_rank(99))
            .await?;
        assert_contiguous(&services, "urn:subject:1").await?;

        let ranks = child_ranks(&services, "urn:subject:1").await?;
        assert_eq!(ranks.last().map(|(child, _)| child.as_str()), Some("urn:topic:1"));
        assert_eq!(ranks.first().map(|(child, _)| child.as_str()), Some("urn:topic:5"));
        Ok(())
    }

    // ========================================================================
    // Primary connections
    // ========================================================================

    #[tokio::test]
    async fn test_exactly_one_primary_parent() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        create_node(&services, "urn:subject:2", NodeType::Subject).await?;
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;

        let first = connect(&services, "urn:subject:1", "urn:topic:1").await?;
        assert_eq!(primary_count(&services, "urn:topic:1").await?, 1);

        // Second parent requested primary: takes over
        let second = connect(&services, "urn:subject:2", "urn:topic:1").await?;
        assert_eq!(primary_count(&services, "urn:topic:1").await?, 1);
        assert!(services.connections.get_connection(&SCOPE, &second).await?.primary);
        assert!(!services.connections.get_connection(&SCOPE, &first).await?.primary);

        // Removing the primary promotes the remaining parent
        services.connections.disconnect_parent_child(&SCOPE, &second).await?;
        assert_eq!(primary_count(&services, "urn:topic:1").await?, 1);
        assert!(services.connections.get_connection(&SCOPE, &first).await?.primary);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_primary_second_parent_keeps_first() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        create_node(&services, "urn:subject:2", NodeType::Subject).await?;
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;

        let first = connect(&services, "urn:subject:1", "urn:topic:1").await?;
        let second = services
            .connections
            .connect_parent_child(
                &SCOPE,
                &id("urn:subject:2"),
                &id("urn:topic:1"),
                Relevance::Supplementary,
                None,
                Some(false),
            )
            .await?;

        assert!(!second.primary);
        assert!(services.connections.get_connection(&SCOPE, &first).await?.primary);
        assert_eq!(primary_count(&services, "urn:topic:1").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_primary_connections_for_parent() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        create_node(&services, "urn:subject:2", NodeType::Subject).await?;
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;
        create_node(&services, "urn:topic:2", NodeType::Topic).await?;

        connect(&services, "urn:subject:2", "urn:topic:1").await?;
        let primary = connect(&services, "urn:subject:1", "urn:topic:1").await?;
        // topic:2 only has subject:1 and keeps it as primary
        connect(&services, "urn:subject:1", "urn:topic:2").await?;

        let replaced = services
            .connections
            .replace_primary_connections_for(&SCOPE, &id("urn:subject:1"))
            .await?;
        assert_eq!(replaced, 1);
        assert!(!services.connections.get_connection(&SCOPE, &primary).await?.primary);
        assert_eq!(primary_count(&services, "urn:topic:1").await?, 1);
        assert_eq!(primary_count(&services, "urn:topic:2").await?, 1);
        Ok(())
    }

    // ========================================================================
    // Rejected mutations
    // ========================================================================

    #[tokio::test]
    async fn test_cycle_is_rejected() -> Result<()> {
        let services = create_services();
        for n in 1..=3 {
            create_node(&services, &format!("urn:topic:{}", n), NodeType::Topic).await?;
        }
        connect(&services, "urn:topic:1", "urn:topic:2").await?;
        connect(&services, "urn:topic:2", "urn:topic:3").await?;

        let err = connect(&services, "urn:topic:3", "urn:topic:1")
            .await
            .unwrap_err()
            .downcast::<TaxonomyError>()?;
        assert!(matches!(err, TaxonomyError::WouldCreateCycle { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.ids(), vec!["urn:topic:3".to_string(), "urn:topic:1".to_string()]);

        // Nothing was written
        assert!(child_ranks(&services, "urn:topic:3").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_self_connection_is_rejected() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;

        let err = connect(&services, "urn:topic:1", "urn:topic:1")
            .await
            .unwrap_err()
            .downcast::<TaxonomyError>()?;
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_connection_is_rejected() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;
        connect(&services, "urn:subject:1", "urn:topic:1").await?;

        let err = connect(&services, "urn:subject:1", "urn:topic:1")
            .await
            .unwrap_err()
            .downcast::<TaxonomyError>()?;
        assert_eq!(err.kind(), ErrorKind::DuplicateConnection);
        assert_eq!(child_ranks(&services, "urn:subject:1").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_not_found() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;

        let err = connect(&services, "urn:subject:1", "urn:topic:404")
            .await
            .unwrap_err()
            .downcast::<TaxonomyError>()?;
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.ids(), vec!["urn:topic:404".to_string()]);
        Ok(())
    }

    // ========================================================================
    // Node deletion
    // ========================================================================

    #[tokio::test]
    async fn test_delete_node_severs_connections() -> Result<()> {
        let services = create_services();
        create_node(&services, "urn:subject:1", NodeType::Subject).await?;
        create_node(&services, "urn:subject:2", NodeType::Subject).await?;
        create_node(&services, "urn:topic:1", NodeType::Topic).await?;
        create_node(&services, "urn:topic:2", NodeType::Topic).await?;
        create_node(&services, "urn:resource:1", NodeType::Resource).await?;

        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        connect(&services, "urn:subject:1", "urn:topic:2").await?;
        connect(&services, "urn:subject:2", "urn:topic:1").await?;
        let via_topic_2 = connect(&services, "urn:topic:2", "urn:resource:1").await?;
        connect(&services, "urn:topic:1", "urn:resource:1").await?;

        let result = services.nodes.delete_node(&SCOPE, &id("urn:topic:1")).await?;
        assert!(result.existed);
        assert_eq!(result.disconnected, 3);

        // The resource falls back to its remaining parent
        assert!(services.connections.get_connection(&SCOPE, &via_topic_2).await?.primary);
        let resource = services.nodes.get_node(&SCOPE, &id("urn:resource:1")).await?;
        assert_eq!(resource.contexts.len(), 1);
        assert_eq!(resource.contexts[0].path, "/subject:1/topic:2/resource:1");

        // Sibling ranks were closed up
        assert_contiguous(&services, "urn:subject:1").await?;
        assert_eq!(child_ranks(&services, "urn:subject:2").await?.len(), 0);

        // Idempotent
        let again = services.nodes.delete_node(&SCOPE, &id("urn:topic:1")).await?;
        assert!(!again.existed);
        Ok(())
    }
}
