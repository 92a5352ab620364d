//! Performance benchmarks for taxonomy core operations
//!
//! Run with: `cargo bench -p taxonomy-core`
//!
//! These benchmarks measure critical path performance:
//! - Context recomputation below a subject with shared resources
//! - Sorted subtree listing
//! - Connect with rank shifting (full transaction incl. contexts)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use taxonomy_core::db::MemoryStore;
use taxonomy_core::models::{Connection, Node, NodeType, PublicId, Relevance, StoreScope, TaxonomyGraph};
use taxonomy_core::services::{ContextUpdater, TaxonomyServices, TreeService, TransactionManager};
use taxonomy_core::TaxonomyConfig;
use tokio::runtime::Runtime;

fn id(kind: &str, n: usize) -> PublicId {
    PublicId::from_parts(kind, n).unwrap()
}

/// One subject, `topics` topics, each topic linking `resources` resources
/// drawn from a shared pool so most resources have several parents
fn build_graph(topics: usize, resources: usize) -> TaxonomyGraph {
    let mut graph = TaxonomyGraph::new();
    graph.upsert_node(Node::with_public_id(id("subject", 1), NodeType::Subject, "Subject"));
    for r in 0..resources {
        graph.upsert_node(Node::with_public_id(id("resource", r), NodeType::Resource, "Resource"));
    }
    for t in 0..topics {
        graph.upsert_node(Node::with_public_id(id("topic", t), NodeType::Topic, "Topic"));
        let mut connection = Connection::new(id("subject", 1), id("topic", t), Relevance::Core);
        connection.rank = t as i32 + 1;
        graph.insert_connection(connection);

        for k in 0..resources / 2 {
            let resource = (t * 7 + k) % resources;
            if graph.find_connection(&id("topic", t), &id("resource", resource)).is_some() {
                continue;
            }
            let mut connection = Connection::new(id("topic", t), id("resource", resource), Relevance::Core);
            connection.rank = k as i32 + 1;
            connection.primary = t == 0;
            graph.insert_connection(connection);
        }
    }
    graph
}

fn bench_context_computation(c: &mut Criterion) {
    let graph = build_graph(20, 100);
    let updater = ContextUpdater::new(1000);
    let resource = id("resource", 42);

    c.bench_function("compute_contexts_shared_resource", |b| {
        b.iter(|| black_box(updater.compute_contexts(&graph, &resource).unwrap()))
    });
}

fn bench_tree_listing(c: &mut Criterion) {
    let graph = build_graph(20, 100);
    let transactions = Arc::new(TransactionManager::new(Arc::new(MemoryStore::new())));
    let trees = TreeService::new(transactions, 1000);
    let subject = id("subject", 1);

    c.bench_function("collect_subtree_20x50", |b| {
        b.iter(|| black_box(trees.collect(&graph, &subject, None).unwrap()))
    });
}

fn bench_connect(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("connect_at_rank_1_of_50", |b| {
        b.iter_batched(
            || {
                rt.block_on(async {
                    let services = TaxonomyServices::new(Arc::new(MemoryStore::new()), TaxonomyConfig::default());
                    let scope = StoreScope::Default;
                    let store = services.transactions.store().clone();
                    store
                        .save_node(&scope, Node::with_public_id(id("subject", 1), NodeType::Subject, "S"))
                        .await
                        .unwrap();
                    for t in 0..=50 {
                        store
                            .save_node(&scope, Node::with_public_id(id("topic", t), NodeType::Topic, "T"))
                            .await
                            .unwrap();
                    }
                    for t in 1..=50 {
                        services
                            .connections
                            .connect_parent_child(&scope, &id("subject", 1), &id("topic", t), Relevance::Core, None, None)
                            .await
                            .unwrap();
                    }
                    services
                })
            },
            |services| {
                rt.block_on(async {
                    services
                        .connections
                        .connect_parent_child(
                            &StoreScope::Default,
                            &id("subject", 1),
                            &id("topic", 0),
                            Relevance::Core,
                            Some(1),
                            None,
                        )
                        .await
                        .unwrap()
                })
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_context_computation, bench_tree_listing, bench_connect);
criterion_main!(benches);
