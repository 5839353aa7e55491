//! Identity types for Ballast entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Identifier of a context (hierarchical grouping of content).
pub type ContextId = Uuid;

/// Identifier of a content item (text/code/image/list).
pub type ContentId = Uuid;

/// Identifier of the project a context belongs to.
pub type ProjectId = Uuid;

/// Identifier of a graph edge.
pub type EdgeId = Uuid;

/// Identifier of a content tag.
pub type TagId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for payload-change detection and integrity verification.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}
