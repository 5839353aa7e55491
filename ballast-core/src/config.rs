//! Configuration types

use crate::{BallastResult, BallastError, ConfigError, InheritancePolicy, UnknownContentPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for upstream store read paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

/// Master configuration for the optimization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Token budget used when neither the call nor the context settings
    /// supply one.
    pub token_budget: i32,
    /// Minimum effective relevance for rankable admission (0.0 disables).
    pub relevance_threshold: f32,
    /// How the effective candidate set is derived from the hierarchy.
    pub inheritance_policy: InheritancePolicy,
    /// Per-level relevance multiplier for inherited candidates (1.0 disables).
    pub inheritance_dampening: f32,
    /// What to do with content whose token cost cannot be computed.
    pub unknown_content: UnknownContentPolicy,
    /// Hard cap on hierarchy traversal depth; doubles as the guard against
    /// cyclic or pathological graphs.
    pub max_hierarchy_depth: u32,
    /// Relevance updates for the same key within this window collapse into
    /// one persisted write.
    pub debounce_window: Duration,
    /// Recompute triggers for the same context within this window coalesce
    /// into one optimization pass.
    pub recompute_window: Duration,
    /// Timeout applied to individual store calls.
    pub store_timeout: Duration,
    /// Bounded backoff for store read paths.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Build a default engine configuration for a token budget.
    ///
    /// This centralizes the sane defaults that callers can reuse without
    /// hardcoding policy at the integration layer.
    pub fn default_engine(token_budget: i32) -> Self {
        Self {
            token_budget,
            relevance_threshold: 0.0,
            inheritance_policy: InheritancePolicy::OwnOnly,
            inheritance_dampening: 1.0,
            unknown_content: UnknownContentPolicy::SkipAndFlag,
            max_hierarchy_depth: 64,
            debounce_window: Duration::from_millis(250),
            recompute_window: Duration::from_millis(100),
            store_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(10),
                backoff_multiplier: 2.0,
            },
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(BallastError::Config) if invalid.
    pub fn validate(&self) -> BallastResult<()> {
        if self.token_budget <= 0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "token_budget".to_string(),
                value: self.token_budget.to_string(),
                reason: "token_budget must be greater than 0".to_string(),
            }));
        }

        if self.relevance_threshold < 0.0 || self.relevance_threshold > 1.0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "relevance_threshold".to_string(),
                value: self.relevance_threshold.to_string(),
                reason: "relevance_threshold must be between 0.0 and 1.0".to_string(),
            }));
        }

        if self.inheritance_dampening <= 0.0 || self.inheritance_dampening > 1.0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "inheritance_dampening".to_string(),
                value: self.inheritance_dampening.to_string(),
                reason: "inheritance_dampening must be in (0.0, 1.0]".to_string(),
            }));
        }

        if self.max_hierarchy_depth == 0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "max_hierarchy_depth".to_string(),
                value: self.max_hierarchy_depth.to_string(),
                reason: "max_hierarchy_depth must be greater than 0".to_string(),
            }));
        }

        if self.store_timeout.is_zero() {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "store_timeout".to_string(),
                value: format!("{:?}", self.store_timeout),
                reason: "store_timeout must be positive".to_string(),
            }));
        }

        if self.retry.max_retries < 0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "retry.max_retries".to_string(),
                value: self.retry.max_retries.to_string(),
                reason: "max_retries must be non-negative".to_string(),
            }));
        }

        if self.retry.backoff_multiplier <= 0.0 {
            return Err(BallastError::Config(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier".to_string(),
                value: self.retry.backoff_multiplier.to_string(),
                reason: "backoff_multiplier must be positive".to_string(),
            }));
        }

        Ok(())
    }
}

// ============================================================================
// ENGINE DEFAULTS
// ============================================================================

/// Default values an integration layer can apply when request parameters are
/// not specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Default token budget for optimization requests
    pub token_budget: i32,
    /// Default debounce window in milliseconds
    pub debounce_ms: u64,
    /// Default recompute coalesce window in milliseconds
    pub recompute_ms: u64,
    /// Default hierarchy depth cap
    pub max_hierarchy_depth: u32,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            token_budget: 8000,
            debounce_ms: 250,
            recompute_ms: 100,
            max_hierarchy_depth: 64,
        }
    }
}

impl EngineDefaults {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `BALLAST_TOKEN_BUDGET`: default token budget (default: 8000)
    /// - `BALLAST_DEBOUNCE_MS`: debounce window in ms (default: 250)
    /// - `BALLAST_RECOMPUTE_MS`: recompute coalesce window in ms (default: 100)
    /// - `BALLAST_MAX_HIERARCHY_DEPTH`: traversal depth cap (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            token_budget: std::env::var("BALLAST_TOKEN_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.token_budget),
            debounce_ms: std::env::var("BALLAST_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.debounce_ms),
            recompute_ms: std::env::var("BALLAST_RECOMPUTE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.recompute_ms),
            max_hierarchy_depth: std::env::var("BALLAST_MAX_HIERARCHY_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_hierarchy_depth),
        }
    }

    /// Expand into a full engine configuration.
    pub fn into_config(self) -> EngineConfig {
        let mut config = EngineConfig::default_engine(self.token_budget);
        config.debounce_window = Duration::from_millis(self.debounce_ms);
        config.recompute_window = Duration::from_millis(self.recompute_ms);
        config.max_hierarchy_depth = self.max_hierarchy_depth;
        config
    }
}

// ============================================================================
// TESTS
// ============================================================================
