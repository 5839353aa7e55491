//! The relevance sync coordinator.
//!
//! Serializes concurrent relevance/selection updates per (context, content)
//! key: apply optimistically, debounce, persist with at most one in-flight
//! write per key, and roll back to the confirmed value when the backend
//! rejects the write. Rollbacks are pushed as events, never polled.
//!
//! State machine per key:
//!
//! ```text
//! Confirmed ── optimistic apply ──→ PendingOptimistic ── accepted ──→ Confirmed
//!     ↑                                    │
//!     └──────── rejected (rollback) ───────┘
//! ```

use crate::events::SyncEvent;
use ballast_core::{
    BallastError, BallastResult, ContentId, ContentItem, ContentType, ContextId, ContextItem,
    EntityId, EntityType, GraphError, TokenBudgetPlan,
};
use ballast_engine::{validate_score, ContentPayload, OptimizationEngine};
use ballast_store::{ContextItemUpdate, GraphStore};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

type Key = (ContextId, ContentId);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-key synchronization state.
#[derive(Debug, Clone)]
struct KeyState {
    confirmed_selected: bool,
    confirmed_relevance: f32,
    pending_selected: Option<bool>,
    pending_relevance: Option<f32>,
    /// At most one persistence attempt per key may be in flight.
    in_flight: bool,
    /// Bumped per relevance update; identifies the debounce timer that owns
    /// the flush.
    epoch: u64,
}

impl KeyState {
    fn seed(item: &ContextItem) -> Self {
        Self {
            confirmed_selected: item.selected,
            confirmed_relevance: item.relevance_score,
            pending_selected: item.pending_selected,
            pending_relevance: None,
            in_flight: false,
            epoch: 0,
        }
    }

    fn effective_selected(&self) -> bool {
        self.pending_selected.unwrap_or(self.confirmed_selected)
    }

    fn effective_relevance(&self) -> f32 {
        self.pending_relevance.unwrap_or(self.confirmed_relevance)
    }

    fn has_pending(&self) -> bool {
        self.pending_selected.is_some() || self.pending_relevance.is_some()
    }
}

/// Outcome of one flush attempt.
enum FlushStatus {
    /// The pending values were persisted and confirmed.
    Completed,
    /// The write was rejected and the optimistic values rolled back.
    Failed(String),
    /// Another write is in flight; it will follow up with the latest values.
    Deferred,
    /// Nothing to do (no pending values, or a newer update owns the flush).
    Idle,
}

/// Per-item result of a selection call.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub content_id: ContentId,
    pub accepted: bool,
    /// Effective selection after the call.
    pub selected: bool,
    pub reason: Option<String>,
}

struct Shared<S> {
    engine: Arc<OptimizationEngine<S>>,
    store: Arc<S>,
    keys: Mutex<HashMap<Key, KeyState>>,
    recompute_epochs: Mutex<HashMap<ContextId, u64>>,
    events: broadcast::Sender<SyncEvent>,
    debounce_window: Duration,
    recompute_window: Duration,
}

/// Coordinates optimistic updates between UI actors and the store.
///
/// Cheap to clone; clones share all state.
pub struct SyncCoordinator<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for SyncCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: GraphStore + 'static> SyncCoordinator<S> {
    /// Create a coordinator over an engine. Debounce and recompute windows
    /// come from the engine configuration.
    pub fn new(engine: Arc<OptimizationEngine<S>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let debounce_window = engine.config().debounce_window;
        let recompute_window = engine.config().recompute_window;
        let store = engine.store();
        let shared = Shared {
            engine,
            store,
            keys: Mutex::new(HashMap::new()),
            recompute_epochs: Mutex::new(HashMap::new()),
            events,
            debounce_window,
            recompute_window,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Subscribe to failure/rollback and recompute events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// The engine behind this coordinator.
    pub fn engine(&self) -> Arc<OptimizationEngine<S>> {
        Arc::clone(&self.shared.engine)
    }

    /// Run one optimization pass for a context.
    pub async fn optimize(
        &self,
        context_id: ContextId,
        token_budget: Option<i32>,
    ) -> BallastResult<TokenBudgetPlan> {
        self.shared.engine.optimize(context_id, token_budget).await
    }

    /// Apply a relevance update optimistically and return the new effective
    /// score immediately.
    ///
    /// Updates for the same key arriving within the debounce window collapse:
    /// only the last value is persisted, but every intermediate value is
    /// visible through [`effective_state`](Self::effective_state) meanwhile.
    pub async fn set_relevance(
        &self,
        context_id: ContextId,
        content_id: ContentId,
        score: f32,
        actor_id: Option<EntityId>,
    ) -> BallastResult<f32> {
        validate_score(score)?;
        let key = (context_id, content_id);
        self.ensure_seeded(key).await?;

        let epoch = {
            let mut keys = self.shared.keys.lock().await;
            let state = keys.get_mut(&key).ok_or_else(|| missing_state(key))?;
            state.pending_relevance = Some(score);
            state.epoch += 1;
            state.epoch
        };
        debug!(
            context = %context_id,
            content = %content_id,
            score,
            actor = ?actor_id,
            "optimistic relevance applied"
        );

        let coordinator = self.clone();
        let window = self.shared.debounce_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            coordinator.flush(key, Some(epoch), actor_id).await;
        });
        Ok(score)
    }

    /// Apply selection updates optimistically and persist them.
    ///
    /// Selection is not debounced: each item flushes immediately, subject to
    /// the one-in-flight-write-per-key rule. An item whose write is deferred
    /// behind an in-flight write reports accepted; a later rejection still
    /// surfaces through the event channel.
    pub async fn set_selection(
        &self,
        context_id: ContextId,
        content_ids: &[ContentId],
        selected: bool,
        actor_id: Option<EntityId>,
    ) -> BallastResult<Vec<SelectionOutcome>> {
        let mut outcomes = Vec::with_capacity(content_ids.len());
        for &content_id in content_ids {
            let key = (context_id, content_id);
            if let Err(err) = self.ensure_seeded(key).await {
                outcomes.push(SelectionOutcome {
                    content_id,
                    accepted: false,
                    selected: false,
                    reason: Some(err.to_string()),
                });
                continue;
            }
            {
                let mut keys = self.shared.keys.lock().await;
                if let Some(state) = keys.get_mut(&key) {
                    state.pending_selected = Some(selected);
                }
            }
            let status = self.flush(key, None, actor_id).await;
            let (accepted, reason) = match status {
                FlushStatus::Completed | FlushStatus::Deferred | FlushStatus::Idle => (true, None),
                FlushStatus::Failed(reason) => (false, Some(reason)),
            };
            let effective = self.effective_state(context_id, content_id).await?.0;
            outcomes.push(SelectionOutcome {
                content_id,
                accepted,
                selected: effective,
                reason,
            });
        }
        Ok(outcomes)
    }

    /// The effective (selected, relevance) pair for a key: optimistic values
    /// when pending, confirmed values otherwise.
    pub async fn effective_state(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<(bool, f32)> {
        let key = (context_id, content_id);
        self.ensure_seeded(key).await?;
        let keys = self.shared.keys.lock().await;
        let state = keys.get(&key).ok_or_else(|| missing_state(key))?;
        Ok((state.effective_selected(), state.effective_relevance()))
    }

    /// Ingest a payload, attach it to a context, and schedule a plan
    /// recompute for that context.
    pub async fn attach_content(
        &self,
        context_id: ContextId,
        content_type: ContentType,
        payload: &ContentPayload,
        position: i32,
    ) -> BallastResult<(ContentItem, ContextItem)> {
        let attached = self
            .shared
            .engine
            .ingest()
            .attach_content(context_id, content_type, payload, position)
            .await?;
        self.request_recompute(context_id).await;
        Ok(attached)
    }

    /// Detach content from a context and schedule a plan recompute.
    ///
    /// The key's optimistic state is discarded with the join row; a timer
    /// still in flight for it lands on nothing and stays silent.
    pub async fn detach_content(
        &self,
        context_id: ContextId,
        content_id: ContentId,
    ) -> BallastResult<()> {
        self.shared
            .engine
            .ingest()
            .detach_content(context_id, content_id)
            .await?;
        self.shared.keys.lock().await.remove(&(context_id, content_id));
        self.request_recompute(context_id).await;
        Ok(())
    }

    /// Request a plan recompute for a context.
    ///
    /// Triggers arriving within the recompute window coalesce into one
    /// optimization pass; the resulting plan (or failure) is broadcast.
    pub async fn request_recompute(&self, context_id: ContextId) {
        let epoch = {
            let mut epochs = self.shared.recompute_epochs.lock().await;
            let counter = epochs.entry(context_id).or_insert(0);
            *counter += 1;
            *counter
        };
        let coordinator = self.clone();
        let window = self.shared.recompute_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            {
                let epochs = coordinator.shared.recompute_epochs.lock().await;
                // A newer trigger owns the recompute.
                if epochs.get(&context_id).copied() != Some(epoch) {
                    return;
                }
            }
            match coordinator.shared.engine.optimize(context_id, None).await {
                Ok(plan) => {
                    let _ = coordinator
                        .shared
                        .events
                        .send(SyncEvent::PlanRecomputed { context_id, plan });
                }
                Err(err) => {
                    let _ = coordinator.shared.events.send(SyncEvent::RecomputeFailed {
                        context_id,
                        reason: err.to_string(),
                    });
                }
            }
        });
    }

    /// Persist the latest pending values for a key.
    ///
    /// `expected_epoch` is set by debounce timers so a superseded timer
    /// yields to the newest one. Exactly one write per key is in flight at a
    /// time; a write that completes while newer values are pending spawns a
    /// single follow-up flush. A rejected write clears every pending value,
    /// restores the confirmed ones, and emits one failure event per affected
    /// dimension.
    fn flush(
        &self,
        key: Key,
        expected_epoch: Option<u64>,
        actor_id: Option<EntityId>,
    ) -> Pin<Box<dyn Future<Output = FlushStatus> + Send + '_>> {
        Box::pin(self.flush_inner(key, expected_epoch, actor_id))
    }

    async fn flush_inner(
        &self,
        key: Key,
        expected_epoch: Option<u64>,
        actor_id: Option<EntityId>,
    ) -> FlushStatus {
        let (pending_relevance, pending_selected) = {
            let mut keys = self.shared.keys.lock().await;
            let state = match keys.get_mut(&key) {
                Some(state) => state,
                None => return FlushStatus::Idle,
            };
            if let Some(epoch) = expected_epoch {
                if state.epoch != epoch {
                    return FlushStatus::Idle;
                }
            }
            if state.in_flight {
                return FlushStatus::Deferred;
            }
            if !state.has_pending() {
                return FlushStatus::Idle;
            }
            state.in_flight = true;
            (state.pending_relevance, state.pending_selected)
        };

        let update = ContextItemUpdate {
            relevance_score: pending_relevance,
            selected: pending_selected,
            // A confirmed write clears any stale optimistic marker in the
            // store as well.
            pending_selected: pending_selected.map(|_| None),
            ..Default::default()
        };
        let result = self
            .shared
            .store
            .context_item_update(key.0, key.1, update)
            .await;

        let mut needs_recompute = false;
        let status = {
            let mut keys = self.shared.keys.lock().await;
            let state = match keys.get_mut(&key) {
                Some(state) => state,
                None => return FlushStatus::Idle,
            };
            state.in_flight = false;
            match result {
                Ok(()) => {
                    if let Some(value) = pending_relevance {
                        state.confirmed_relevance = value;
                        if state.pending_relevance == Some(value) {
                            state.pending_relevance = None;
                        }
                    }
                    if let Some(value) = pending_selected {
                        state.confirmed_selected = value;
                        if state.pending_selected == Some(value) {
                            state.pending_selected = None;
                        }
                    }
                    needs_recompute = true;
                    // Values superseded while this write was in flight get
                    // exactly one follow-up write.
                    if state.has_pending() {
                        let coordinator = self.clone();
                        tokio::spawn(async move {
                            coordinator.flush(key, None, actor_id).await;
                        });
                    }
                    FlushStatus::Completed
                }
                Err(err) => {
                    let reason = err.to_string();
                    if let Some(attempted) = pending_relevance {
                        let _ = self.shared.events.send(SyncEvent::RelevanceUpdateFailed {
                            context_id: key.0,
                            content_id: key.1,
                            attempted,
                            rolled_back_to: state.confirmed_relevance,
                            actor_id,
                            reason: reason.clone(),
                        });
                    }
                    if let Some(attempted) = pending_selected {
                        let _ = self.shared.events.send(SyncEvent::SelectionUpdateFailed {
                            context_id: key.0,
                            content_id: key.1,
                            attempted,
                            rolled_back_to: state.confirmed_selected,
                            actor_id,
                            reason: reason.clone(),
                        });
                    }
                    state.pending_relevance = None;
                    state.pending_selected = None;
                    warn!(
                        context = %key.0,
                        content = %key.1,
                        reason,
                        "optimistic update rolled back"
                    );
                    FlushStatus::Failed(reason)
                }
            }
        };

        if needs_recompute {
            self.request_recompute(key.0).await;
        }
        status
    }

    /// Load the confirmed state for a key from the store on first touch.
    async fn ensure_seeded(&self, key: Key) -> BallastResult<()> {
        {
            let keys = self.shared.keys.lock().await;
            if keys.contains_key(&key) {
                return Ok(());
            }
        }
        let item = self
            .shared
            .store
            .context_item_get(key.0, key.1)
            .await?
            .ok_or_else(|| missing_state(key))?;
        let mut keys = self.shared.keys.lock().await;
        keys.entry(key).or_insert_with(|| KeyState::seed(&item));
        Ok(())
    }
}

fn missing_state(key: Key) -> BallastError {
    GraphError::NotFound {
        entity_type: EntityType::ContextItem,
        id: key.1,
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core::{new_entity_id, EngineConfig};
    use ballast_test_utils::{seed_attached, seed_context, CountingGraph, FailingGraph};

    fn coordinator<S: GraphStore + 'static>(store: Arc<S>) -> SyncCoordinator<S> {
        let engine =
            OptimizationEngine::new(store, EngineConfig::default_engine(8000)).unwrap();
        SyncCoordinator::new(Arc::new(engine))
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_to_one_write_with_last_value() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let content = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        // Three slider ticks inside one debounce window.
        for score in [0.1, 0.2, 0.3] {
            let effective = sync
                .set_relevance(context.context_id, content.content_id, score, None)
                .await
                .unwrap();
            assert_eq!(effective, score);
        }

        // Every intermediate value is already visible optimistically.
        let (_, relevance) = sync
            .effective_state(context.context_id, content.content_id)
            .await
            .unwrap();
        assert_eq!(relevance, 0.3);
        assert_eq!(store.item_update_count(), 0);

        // Let the window elapse and the flush run.
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(store.item_update_count(), 1);
        let item = store
            .inner()
            .context_item_get(context.context_id, content.content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.relevance_score, 0.3);

        // Confirmed now matches; the pending value is gone.
        let (_, relevance) = sync
            .effective_state(context.context_id, content.content_id)
            .await
            .unwrap();
        assert_eq!(relevance, 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_persists_and_recomputes() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let mut events = sync.subscribe();

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let content = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        let outcomes = sync
            .set_selection(context.context_id, &[content.content_id], true, None)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].accepted);
        assert!(outcomes[0].selected);

        let item = store
            .inner()
            .context_item_get(context.context_id, content.content_id)
            .await
            .unwrap()
            .unwrap();
        assert!(item.selected);
        assert!(item.pending_selected.is_none());

        // The confirmed change triggers a coalesced recompute.
        let event = events.recv().await.unwrap();
        match event {
            SyncEvent::PlanRecomputed { context_id, plan } => {
                assert_eq!(context_id, context.context_id);
                assert!(plan.is_admitted(content.content_id));
            }
            other => panic!("expected PlanRecomputed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_failure_rolls_back_and_reports_once() {
        let store = Arc::new(FailingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let mut events = sync.subscribe();

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let content = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        store.set_fail_item_updates(true);
        let outcomes = sync
            .set_selection(context.context_id, &[content.content_id], true, None)
            .await
            .unwrap();
        assert!(!outcomes[0].accepted);
        assert!(!outcomes[0].selected);
        assert!(outcomes[0].reason.as_deref().unwrap().contains("injected fault"));

        let event = events.recv().await.unwrap();
        match event {
            SyncEvent::SelectionUpdateFailed {
                attempted,
                rolled_back_to,
                ..
            } => {
                assert!(attempted);
                assert!(!rolled_back_to);
            }
            other => panic!("expected SelectionUpdateFailed, got {:?}", other),
        }

        // Effective value is back to the confirmed one.
        let (selected, _) = sync
            .effective_state(context.context_id, content.content_id)
            .await
            .unwrap();
        assert!(!selected);

        // The store was never left with a half-applied selection.
        let item = store
            .inner()
            .context_item_get(context.context_id, content.content_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!item.selected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relevance_failure_rolls_back_optimistic_value() {
        let store = Arc::new(FailingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let mut events = sync.subscribe();

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let content = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        store.set_fail_item_updates(true);
        let effective = sync
            .set_relevance(context.context_id, content.content_id, 0.9, None)
            .await
            .unwrap();
        assert_eq!(effective, 0.9);

        let event = events.recv().await.unwrap();
        match event {
            SyncEvent::RelevanceUpdateFailed {
                attempted,
                rolled_back_to,
                ..
            } => {
                assert_eq!(attempted, 0.9);
                assert_eq!(rolled_back_to, 0.5);
            }
            other => panic!("expected RelevanceUpdateFailed, got {:?}", other),
        }

        let (_, relevance) = sync
            .effective_state(context.context_id, content.content_id)
            .await
            .unwrap();
        assert_eq!(relevance, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_score_rejected_synchronously() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let err = sync
            .set_relevance(new_entity_id(), new_entity_id(), 1.5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BallastError::Relevance(_)));
        assert_eq!(store.item_update_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pair_is_rejected_per_item() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let known = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();
        let unknown = new_entity_id();

        let outcomes = sync
            .set_selection(
                context.context_id,
                &[known.content_id, unknown],
                true,
                None,
            )
            .await
            .unwrap();
        assert!(outcomes[0].accepted);
        assert!(!outcomes[1].accepted);
        assert!(outcomes[1].reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recompute_triggers_coalesce() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let mut events = sync.subscribe();

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        for _ in 0..5 {
            sync.request_recompute(context.context_id).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Exactly one plan event for the burst of triggers.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SyncEvent::PlanRecomputed { .. }));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_and_detach_trigger_recompute() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));
        let mut events = sync.subscribe();

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();

        let (content, _) = sync
            .attach_content(
                context.context_id,
                ballast_core::ContentType::Text,
                &ContentPayload::Text("attached through the coordinator".to_string()),
                0,
            )
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        match event {
            SyncEvent::PlanRecomputed { plan, .. } => {
                assert!(plan.is_admitted(content.content_id));
            }
            other => panic!("expected PlanRecomputed, got {:?}", other),
        }

        sync.detach_content(context.context_id, content.content_id)
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        match event {
            SyncEvent::PlanRecomputed { plan, .. } => {
                assert!(plan.entries.is_empty());
            }
            other => panic!("expected PlanRecomputed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseding_update_wins() {
        let store = Arc::new(CountingGraph::new());
        let sync = coordinator(Arc::clone(&store));

        let context = seed_context(store.as_ref(), new_entity_id()).await.unwrap();
        let content = seed_attached(store.as_ref(), context.context_id, 10, 0.5, 0)
            .await
            .unwrap();

        sync.set_relevance(context.context_id, content.content_id, 0.2, None)
            .await
            .unwrap();
        // Let the first flush land, then supersede in a later window.
        tokio::time::sleep(Duration::from_millis(500)).await;
        sync.set_relevance(context.context_id, content.content_id, 0.8, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let item = store
            .inner()
            .context_item_get(context.context_id, content.content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.relevance_score, 0.8);
        assert_eq!(store.item_update_count(), 2);
    }
}
