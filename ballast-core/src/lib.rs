//! Ballast Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic.

mod config;
mod entities;
mod enums;
mod error;
mod identity;
mod plan;

pub use config::{EngineConfig, EngineDefaults, RetryConfig};
pub use entities::{
    Context, ContextItem, ContextSettings, ContentItem, Edge, DEFAULT_RELEVANCE,
};
pub use enums::{
    ContentType, EdgeType, EntityType, InheritancePolicy, PlanReason, UnknownContentPolicy,
};
pub use error::{
    BallastError, BallastResult, ConfigError, GraphError, HierarchyError, OptimizerError,
    RelevanceError, SyncError, TokenError,
};
pub use identity::{
    compute_content_hash, new_entity_id, ContentHash, ContentId, ContextId, EdgeId, EntityId,
    ProjectId, TagId, Timestamp,
};
pub use plan::{PlanAction, PlanDecision, PlanEntry, TokenBudgetPlan};
