//! Enumerations shared across the Ballast crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CONTENT ENUMS
// ============================================================================

/// Type of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Plain prose text
    Text,
    /// Source code
    Code,
    /// Image, costed by resolution band
    Image,
    /// Ordered list rendered to text before costing
    List,
}

/// Entity type discriminator for polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Context,
    ContentItem,
    ContextItem,
    Edge,
}

// ============================================================================
// GRAPH ENUMS
// ============================================================================

/// Type of directed edge between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Context → child context ownership
    ParentOf,
    /// Project → context membership
    HasContext,
    /// Content ↔ content similarity (stored as two directed edges)
    SimilarTo,
    /// Content derived from another content item
    DerivedFrom,
    /// Content referencing another content item
    References,
}

impl EdgeType {
    /// Whether the edge type is logically symmetric.
    /// Symmetric relations are stored as two directed edges for uniform traversal.
    pub const fn is_symmetric(&self) -> bool {
        matches!(self, EdgeType::SimilarTo)
    }
}

/// Policy for deriving a context's effective candidate set from the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InheritancePolicy {
    /// Only the context's own items
    #[default]
    OwnOnly,
    /// Own items unioned with every ancestor's items up to the root
    IncludeAncestors,
    /// Own items unioned with every descendant's items
    IncludeDescendants,
}

// ============================================================================
// PLAN ENUMS
// ============================================================================

/// Why a plan entry was admitted or excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanReason {
    /// Admitted: selection was explicitly forced by the user
    Pinned,
    /// Admitted: won its slot on relevance ranking
    Ranked,
    /// Excluded: pinned items alone exhausted the budget before this one
    BudgetExceededByPinned,
    /// Excluded: item alone is larger than the entire remaining budget
    ExceedsRemainingBudget,
    /// Excluded: effective relevance fell below the configured threshold
    BelowThreshold,
    /// Excluded: token cost could not be computed for this content type
    UnsupportedContent,
}

impl PlanReason {
    /// Whether the reason describes an admitted entry.
    pub const fn is_admit(&self) -> bool {
        matches!(self, PlanReason::Pinned | PlanReason::Ranked)
    }
}

/// What to do with content whose token cost cannot be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UnknownContentPolicy {
    /// Exclude the item from optimization and flag it in the plan
    #[default]
    SkipAndFlag,
    /// Reject the whole operation
    Reject,
}

// ============================================================================
// STRING CONVERSIONS
// ============================================================================

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ContentType::Text => "Text",
            ContentType::Code => "Code",
            ContentType::Image => "Image",
            ContentType::List => "List",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "text" => Ok(ContentType::Text),
            "code" => Ok(ContentType::Code),
            "image" => Ok(ContentType::Image),
            "list" => Ok(ContentType::List),
            _ => Err(format!("Invalid ContentType: {}", s)),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EdgeType::ParentOf => "ParentOf",
            EdgeType::HasContext => "HasContext",
            EdgeType::SimilarTo => "SimilarTo",
            EdgeType::DerivedFrom => "DerivedFrom",
            EdgeType::References => "References",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "parentof" => Ok(EdgeType::ParentOf),
            "hascontext" => Ok(EdgeType::HasContext),
            "similarto" => Ok(EdgeType::SimilarTo),
            "derivedfrom" => Ok(EdgeType::DerivedFrom),
            "references" => Ok(EdgeType::References),
            _ => Err(format!("Invalid EdgeType: {}", s)),
        }
    }
}

impl fmt::Display for InheritancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            InheritancePolicy::OwnOnly => "OwnOnly",
            InheritancePolicy::IncludeAncestors => "IncludeAncestors",
            InheritancePolicy::IncludeDescendants => "IncludeDescendants",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for InheritancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "ownonly" => Ok(InheritancePolicy::OwnOnly),
            "includeancestors" => Ok(InheritancePolicy::IncludeAncestors),
            "includedescendants" => Ok(InheritancePolicy::IncludeDescendants),
            _ => Err(format!("Invalid InheritancePolicy: {}", s)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
