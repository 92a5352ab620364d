//! Context Cache Tests
//!
//! Integration tests for cached contexts (root-to-node paths).
//!
//! ## Key Concepts
//! - A node flagged `is_context` (subjects by default) starts its own path
//! - Every parent connection extends every context of the parent
//! - A context node reached through a parent gets a non-primary extended
//!   context next to its own primary root context
//! - Visibility is AND-ed along the path
//!
//! ## Test Coverage
//! - Contexts after connect / disconnect / flag changes
//! - Context selection (`pick_context`)
//! - Idempotent recomputation

#[cfg(test)]
mod context_cache_tests {
    use anyhow::Result;
    use std::sync::Arc;
    use taxonomy_core::db::{DomainEvent, MemoryStore};
    use taxonomy_core::models::{
        NewNode, Node, NodeType, NodeUpdate, PublicId, Relevance, StoreScope, TaxonomyConfig,
        TaxonomyContext, SUBJECT_CATEGORY_FIELD,
    };
    use taxonomy_core::services::TaxonomyServices;

    fn id(value: &str) -> PublicId {
        PublicId::parse(value).unwrap()
    }

    fn create_services() -> TaxonomyServices {
        taxonomy_core::init_tracing();
        TaxonomyServices::new(Arc::new(MemoryStore::new()), TaxonomyConfig::default())
    }

    async fn create_node(services: &TaxonomyServices, request: NewNode) -> Result<Node> {
        Ok(services.nodes.create_node(&StoreScope::Default, request).await?)
    }

    fn request(public_id: &str, node_type: NodeType) -> NewNode {
        NewNode::new(node_type, public_id).with_public_id(id(public_id))
    }

    async fn connect(services: &TaxonomyServices, parent: &str, child: &str) -> Result<PublicId> {
        let connection = services
            .connections
            .connect_parent_child(
                &StoreScope::Default,
                &id(parent),
                &id(child),
                Relevance::Core,
                None,
                None,
            )
            .await?;
        Ok(connection.public_id)
    }

    async fn contexts_of(services: &TaxonomyServices, node: &str) -> Result<Vec<TaxonomyContext>> {
        Ok(services
            .nodes
            .get_contexts(&StoreScope::Default, &id(node))
            .await?)
    }

    /// (path, is_primary) pairs sorted by path
    fn paths(contexts: &[TaxonomyContext]) -> Vec<(String, bool)> {
        let mut out: Vec<_> = contexts.iter().map(|c| (c.path.clone(), c.is_primary)).collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_subject_gets_root_context_on_create() -> Result<()> {
        let services = create_services();
        let subject = create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;

        assert!(subject.is_context);
        assert_eq!(subject.contexts.len(), 1);
        assert_eq!(subject.primary_path(), Some("/subject:1"));
        assert!(subject.contexts[0].connection_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_context_topic_has_two_contexts_until_disconnected() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic).with_context(true)).await?;

        let connection = connect(&services, "urn:subject:1", "urn:topic:1").await?;
        assert_eq!(
            paths(&contexts_of(&services, "urn:topic:1").await?),
            vec![
                ("/subject:1/topic:1".to_string(), false),
                ("/topic:1".to_string(), true),
            ]
        );

        services
            .connections
            .disconnect_parent_child(&StoreScope::Default, &connection)
            .await?;
        assert_eq!(
            paths(&contexts_of(&services, "urn:topic:1").await?),
            vec![("/topic:1".to_string(), true)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_shared_resource_has_one_context_per_path() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        create_node(&services, request("urn:topic:2", NodeType::Topic)).await?;
        create_node(&services, request("urn:resource:1", NodeType::Resource)).await?;

        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        connect(&services, "urn:subject:1", "urn:topic:2").await?;
        connect(&services, "urn:topic:1", "urn:resource:1").await?;
        // Second parent is requested primary and takes over
        connect(&services, "urn:topic:2", "urn:resource:1").await?;

        let contexts = contexts_of(&services, "urn:resource:1").await?;
        assert_eq!(
            paths(&contexts),
            vec![
                ("/subject:1/topic:1/resource:1".to_string(), false),
                ("/subject:1/topic:2/resource:1".to_string(), true),
            ]
        );
        for context in &contexts {
            assert_eq!(context.root_id, id("urn:subject:1"));
            assert_eq!(context.parent_ids.len(), 2);
            assert_eq!(context.breadcrumbs.len(), 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_contexts_follow_new_ancestor() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        create_node(&services, request("urn:resource:1", NodeType::Resource)).await?;

        // Build bottom-up: the resource's path only becomes complete with the last edge
        connect(&services, "urn:topic:1", "urn:resource:1").await?;
        assert_eq!(
            paths(&contexts_of(&services, "urn:resource:1").await?),
            vec![("/topic:1/resource:1".to_string(), true)]
        );

        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        assert_eq!(
            paths(&contexts_of(&services, "urn:resource:1").await?),
            vec![("/subject:1/topic:1/resource:1".to_string(), true)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_visibility_is_inherited() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        create_node(&services, request("urn:resource:1", NodeType::Resource)).await?;
        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        connect(&services, "urn:topic:1", "urn:resource:1").await?;

        services
            .nodes
            .update_node(
                &StoreScope::Default,
                &id("urn:topic:1"),
                NodeUpdate::new().with_visible(false),
            )
            .await?;

        let resource = contexts_of(&services, "urn:resource:1").await?;
        assert_eq!(resource.len(), 1);
        assert!(!resource[0].is_visible);
        let subject = contexts_of(&services, "urn:subject:1").await?;
        assert!(subject[0].is_visible);
        Ok(())
    }

    #[tokio::test]
    async fn test_subject_category_drives_activeness() -> Result<()> {
        let services = create_services();
        create_node(
            &services,
            request("urn:subject:1", NodeType::Subject).with_custom_field(SUBJECT_CATEGORY_FIELD, "active"),
        )
        .await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        assert!(contexts_of(&services, "urn:topic:1").await?[0].is_active);

        services
            .nodes
            .update_node(
                &StoreScope::Default,
                &id("urn:subject:1"),
                NodeUpdate::new().with_custom_field(SUBJECT_CATEGORY_FIELD, "archive"),
            )
            .await?;
        assert!(!contexts_of(&services, "urn:topic:1").await?[0].is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_pick_context_policy() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:subject:2", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        connect(&services, "urn:subject:1", "urn:topic:1").await?;
        connect(&services, "urn:subject:2", "urn:topic:1").await?;

        let scope = StoreScope::Default;
        let topic = id("urn:topic:1");
        let contexts = contexts_of(&services, "urn:topic:1").await?;
        assert_eq!(contexts.len(), 2);

        // Exact id wins
        let wanted = contexts[1].context_id.clone();
        let picked = services
            .nodes
            .pick_context(&scope, &topic, Some(&wanted), None, None)
            .await?;
        assert_eq!(picked.map(|c| c.context_id), Some(wanted));

        // Root filter
        let picked = services
            .nodes
            .pick_context(&scope, &topic, None, None, Some(&id("urn:subject:1")))
            .await?;
        assert_eq!(picked.map(|c| c.path), Some("/subject:1/topic:1".to_string()));

        // Unknown id falls back to the shortest path, which always exists here
        let picked = services
            .nodes
            .pick_context(&scope, &topic, Some("nope"), None, None)
            .await?;
        assert!(picked.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_recomputation_is_idempotent() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;
        connect(&services, "urn:subject:1", "urn:topic:1").await?;

        let before = contexts_of(&services, "urn:topic:1").await?;
        let mut rx = services.nodes.subscribe_to_events();
        let changed = services.nodes.rebuild_contexts(&StoreScope::Default).await?;

        assert_eq!(changed, 0);
        assert_eq!(contexts_of(&services, "urn:topic:1").await?, before);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_contexts_updated_event_emitted_after_commit() -> Result<()> {
        let services = create_services();
        create_node(&services, request("urn:subject:1", NodeType::Subject)).await?;
        create_node(&services, request("urn:topic:1", NodeType::Topic)).await?;

        let mut rx = services.nodes.subscribe_to_events();
        connect(&services, "urn:subject:1", "urn:topic:1").await?;

        let mut saw_connection = false;
        let mut saw_contexts = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                DomainEvent::ConnectionCreated { connection, .. } => {
                    assert_eq!(connection.child_id, id("urn:topic:1"));
                    saw_connection = true;
                }
                DomainEvent::ContextsUpdated { node_id, context_count, .. } => {
                    assert_eq!(node_id, id("urn:topic:1"));
                    assert_eq!(context_count, 1);
                    saw_contexts = true;
                }
                _ => {}
            }
        }
        assert!(saw_connection && saw_contexts);
        Ok(())
    }
}
