//! Error types for Ballast operations

use crate::{ContentId, ContextId, EdgeType, EntityType};
use thiserror::Error;
use uuid::Uuid;

/// Token counter errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Unsupported content type: {kind}")]
    UnsupportedContentType { kind: String },
}

/// Relevance model errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelevanceError {
    #[error("Relevance score {score} out of range, must be within [0, 1]")]
    OutOfRange { score: f32 },
}

/// Selection optimizer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptimizerError {
    #[error("Invalid token budget: {budget}, must be greater than 0")]
    InvalidBudget { budget: i32 },
}

/// Context hierarchy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Cycle detected: context {context_id} appears in the ancestor chain {chain:?}")]
    CycleDetected {
        context_id: ContextId,
        chain: Vec<ContextId>,
    },

    #[error("Hierarchy too deep walking from context {context_id}: exceeded cap of {max_depth}")]
    TooDeep { context_id: ContextId, max_depth: u32 },
}

/// Graph store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Entity already exists: {entity_type:?} with id {id}")]
    AlreadyExists { entity_type: EntityType, id: Uuid },

    #[error("Duplicate edge: ({source_id}, {target_id}, {edge_type})")]
    DuplicateEdge {
        source_id: Uuid,
        target_id: Uuid,
        edge_type: EdgeType,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Sync coordinator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Persistence failed for ({context_id}, {content_id}): {reason}")]
    PersistenceFailed {
        context_id: ContextId,
        content_id: ContentId,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Ballast errors.
#[derive(Debug, Clone, Error)]
pub enum BallastError {
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Relevance error: {0}")]
    Relevance(#[from] RelevanceError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BallastError {
    /// Whether the operation may be retried with backoff.
    ///
    /// Only upstream unavailability qualifies, and only read paths retry;
    /// write paths roll back and report once to avoid double-apply.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BallastError::Graph(GraphError::Unavailable { .. }))
    }

    /// Whether the error is a consistency violation: rejected synchronously,
    /// never silently corrected.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            BallastError::Hierarchy(_) | BallastError::Graph(GraphError::DuplicateEdge { .. })
        )
    }
}

/// Result type alias for Ballast operations.
pub type BallastResult<T> = Result<T, BallastError>;

// =============================================================================
// TESTS
// =============================================================================
