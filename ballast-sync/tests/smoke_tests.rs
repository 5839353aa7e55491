//! End-to-end smoke tests for the Ballast engine stack:
//! coordinator → engine → store → confirmation events.

use ballast_core::{
    new_entity_id, ContentType, Context, EngineConfig, InheritancePolicy, PlanReason,
};
use ballast_engine::{ContentPayload, OptimizationEngine};
use ballast_store::{ContentUpdate, GraphStore, MemoryGraph};
use ballast_sync::{SyncCoordinator, SyncEvent};
use std::sync::Arc;
use std::time::Duration;

fn coordinator_with(
    store: &Arc<MemoryGraph>,
    config: EngineConfig,
) -> SyncCoordinator<MemoryGraph> {
    let engine = OptimizationEngine::new(Arc::clone(store), config).unwrap();
    SyncCoordinator::new(Arc::new(engine))
}

#[tokio::test(start_paused = true)]
async fn smoke_test_full_selection_chain() {
    let store = Arc::new(MemoryGraph::new());
    let sync = coordinator_with(&store, EngineConfig::default_engine(700));
    let mut events = sync.subscribe();

    let context = Context::new(new_entity_id(), "conversation");
    store.context_insert(&context).await.unwrap();

    // Attach three candidates, then pin their cached costs and scores to a
    // known scenario: A(500, 0.9), B(400, 0.8), C(300, 0.95).
    let mut content_ids = Vec::new();
    for (position, (tokens, relevance)) in
        [(500, 0.9f32), (400, 0.8), (300, 0.95)].iter().enumerate()
    {
        let (content, _) = sync
            .attach_content(
                context.context_id,
                ContentType::Text,
                &ContentPayload::Text(format!("candidate {}", position)),
                position as i32,
            )
            .await
            .unwrap();
        store
            .content_update(
                content.content_id,
                ContentUpdate {
                    tokens: Some(Some(*tokens)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        sync.set_relevance(context.context_id, content.content_id, *relevance, None)
            .await
            .unwrap();
        content_ids.push(content.content_id);
    }
    let (a_id, b_id, c_id) = (content_ids[0], content_ids[1], content_ids[2]);

    // Let the debounce windows and coalesced recomputes drain.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let event = events.recv().await.unwrap();
    assert!(matches!(event, SyncEvent::PlanRecomputed { .. }));

    // Relevance ranking with the bin-packing relaxation: C then B, A skipped.
    let plan = sync.optimize(context.context_id, Some(700)).await.unwrap();
    assert_eq!(plan.admitted_ids(), vec![c_id, b_id]);
    assert_eq!(plan.total_selected_tokens, 700);
    assert!(!plan.truncated);

    // Pinning A forces it in and starves the rankable candidates.
    let outcomes = sync
        .set_selection(context.context_id, &[a_id], true, None)
        .await
        .unwrap();
    assert!(outcomes[0].accepted);
    assert!(outcomes[0].selected);

    let plan = sync.optimize(context.context_id, Some(700)).await.unwrap();
    assert_eq!(plan.admitted_ids(), vec![a_id]);
    let pinned = plan.entries.iter().find(|e| e.content_id == a_id).unwrap();
    assert_eq!(pinned.reason, PlanReason::Pinned);
    for starved in [b_id, c_id] {
        let entry = plan.entries.iter().find(|e| e.content_id == starved).unwrap();
        assert_eq!(entry.reason, PlanReason::ExceedsRemainingBudget);
    }

    // Detaching the pinned item restores the ranked outcome.
    sync.detach_content(context.context_id, a_id).await.unwrap();
    let plan = sync.optimize(context.context_id, Some(700)).await.unwrap();
    assert_eq!(plan.admitted_ids(), vec![c_id, b_id]);
}

#[tokio::test(start_paused = true)]
async fn smoke_test_hierarchy_chain() {
    let store = Arc::new(MemoryGraph::new());
    let mut config = EngineConfig::default_engine(8000);
    config.inheritance_policy = InheritancePolicy::IncludeAncestors;
    config.inheritance_dampening = 0.5;
    let sync = coordinator_with(&store, config);
    let engine = sync.engine();

    let project = new_entity_id();
    let root = Context::new(project, "workspace");
    let child = Context::new(project, "feature-branch");
    store.context_insert(&root).await.unwrap();
    store.context_insert(&child).await.unwrap();
    engine
        .hierarchy()
        .set_parent(child.context_id, Some(root.context_id))
        .await
        .unwrap();

    // One candidate at each level.
    let (inherited, _) = engine
        .ingest()
        .attach_content(
            root.context_id,
            ContentType::Text,
            &ContentPayload::Text("shared project brief".to_string()),
            0,
        )
        .await
        .unwrap();
    sync.set_relevance(root.context_id, inherited.content_id, 0.8, None)
        .await
        .unwrap();
    let (own, _) = engine
        .ingest()
        .attach_content(
            child.context_id,
            ContentType::Code,
            &ContentPayload::Code("fn main() {}".to_string()),
            0,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    // The child's plan sees the ancestor's item at half relevance.
    let plan = sync.optimize(child.context_id, None).await.unwrap();
    assert!(plan.is_admitted(own.content_id));
    let entry = plan
        .entries
        .iter()
        .find(|e| e.content_id == inherited.content_id)
        .unwrap();
    assert!(entry.included);
    assert!((entry.relevance - 0.4).abs() < f32::EPSILON);

    // The move that would close a loop is rejected outright.
    let err = engine
        .hierarchy()
        .set_parent(root.context_id, Some(child.context_id))
        .await
        .unwrap_err();
    assert!(err.is_consistency_violation());

    // Recursive clone carries the subtree into a fresh project.
    let target_project = new_entity_id();
    let clone_id = sync
        .engine()
        .clone_context(root.context_id, target_project, "workspace-copy", true)
        .await
        .unwrap();
    let tree = engine.project_hierarchy(target_project).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].context.context_id, clone_id);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].context.name, "feature-branch");
}
