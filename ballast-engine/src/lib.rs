//! Ballast Engine - Context Optimization
//!
//! Selects the subset of a context's content that fits a token budget,
//! ranked by relevance and constrained by the context hierarchy. The
//! optimizer itself is a pure computation over a snapshot; everything
//! stateful lives behind the graph store and the sync coordinator.

mod engine;
mod hierarchy;
mod ingest;
mod optimizer;
mod relevance;
mod token;

pub use engine::OptimizationEngine;
pub use hierarchy::{ContextTree, EffectiveCandidate, HierarchyManager};
pub use ingest::ContentIngest;
pub use optimizer::{effective_relevance, optimize, Candidate, OptimizerOptions};
pub use relevance::{validate_score, RelevanceModel};
pub use token::{cost, text_tokens, ContentPayload};
