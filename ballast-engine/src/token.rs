//! Token counting for content payloads.
//!
//! Pure and idempotent for a given payload version. Counts are cached on the
//! `ContentItem` after first computation and invalidated only when the
//! payload or content type changes, so this is cheap enough to sit on the
//! optimization hot path.

use ballast_core::{ContentType, TokenError};

/// Approximate characters per token for prose and code.
const CHARS_PER_TOKEN: usize = 4;

/// Flat per-entry overhead for rendered list bullets.
const LIST_ITEM_OVERHEAD: i32 = 2;

/// Resolution bands for image costing: (longest side, tokens).
const IMAGE_BANDS: [(u32, i32); 3] = [(512, 85), (1024, 340), (2048, 765)];

/// Cost of an image above the largest band.
const IMAGE_TOKENS_MAX: i32 = 1105;

/// A content payload presented for token counting.
///
/// The engine never stores payload bytes; they are handed in at ingestion
/// time, costed, hashed, and returned to the external blob store.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPayload {
    Text(String),
    Code(String),
    Image { width: u32, height: u32 },
    List(Vec<String>),
    /// A payload of a kind the counter does not understand.
    Opaque { kind: String },
}

impl ContentPayload {
    /// The content type this payload maps to, if any.
    pub fn content_type(&self) -> Option<ContentType> {
        match self {
            ContentPayload::Text(_) => Some(ContentType::Text),
            ContentPayload::Code(_) => Some(ContentType::Code),
            ContentPayload::Image { .. } => Some(ContentType::Image),
            ContentPayload::List(_) => Some(ContentType::List),
            ContentPayload::Opaque { .. } => None,
        }
    }

    /// Canonical bytes for payload-change detection.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            ContentPayload::Text(s) | ContentPayload::Code(s) => s.as_bytes().to_vec(),
            ContentPayload::Image { width, height } => {
                format!("image:{}x{}", width, height).into_bytes()
            }
            ContentPayload::List(entries) => entries.join("\n").into_bytes(),
            ContentPayload::Opaque { kind } => kind.as_bytes().to_vec(),
        }
    }
}

/// Compute the token cost of a payload.
///
/// Fails with `UnsupportedContentType` for opaque payloads; whether that
/// skips the item or rejects the whole operation is the caller's policy.
pub fn cost(payload: &ContentPayload) -> Result<i32, TokenError> {
    match payload {
        ContentPayload::Text(text) => Ok(text_tokens(text)),
        ContentPayload::Code(code) => Ok(code_tokens(code)),
        ContentPayload::Image { width, height } => Ok(image_tokens(*width, *height)),
        ContentPayload::List(entries) => Ok(list_tokens(entries)),
        ContentPayload::Opaque { kind } => Err(TokenError::UnsupportedContentType {
            kind: kind.clone(),
        }),
    }
}

/// Whitespace and punctuation aware approximation for prose.
///
/// Alphanumeric runs cost one token per started group of four characters;
/// every punctuation character costs one token of its own.
pub fn text_tokens(text: &str) -> i32 {
    let mut tokens: i64 = 0;
    for word in text.split_whitespace() {
        let mut run_len = 0usize;
        for c in word.chars() {
            if c.is_alphanumeric() {
                run_len += 1;
            } else {
                tokens += chunk_tokens(run_len);
                run_len = 0;
                tokens += 1;
            }
        }
        tokens += chunk_tokens(run_len);
    }
    tokens.min(i32::MAX as i64) as i32
}

/// Code costs like prose plus one token per non-blank line for structure.
fn code_tokens(code: &str) -> i32 {
    let structure: i64 = code.lines().filter(|l| !l.trim().is_empty()).count() as i64;
    (text_tokens(code) as i64 + structure).min(i32::MAX as i64) as i32
}

/// Images cost a constant per resolution band of the longest side.
fn image_tokens(width: u32, height: u32) -> i32 {
    let longest = width.max(height);
    for (bound, tokens) in IMAGE_BANDS {
        if longest <= bound {
            return tokens;
        }
    }
    IMAGE_TOKENS_MAX
}

/// Lists cost the sum of their rendered entries plus bullet overhead.
fn list_tokens(entries: &[String]) -> i32 {
    entries
        .iter()
        .map(|e| text_tokens(e) as i64 + LIST_ITEM_OVERHEAD as i64)
        .sum::<i64>()
        .min(i32::MAX as i64) as i32
}

fn chunk_tokens(run_len: usize) -> i64 {
    run_len.div_ceil(CHARS_PER_TOKEN) as i64
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_free() {
        assert_eq!(text_tokens(""), 0);
        assert_eq!(text_tokens("   \n\t"), 0);
    }

    #[test]
    fn test_text_tokens_by_word_chunks() {
        // "hello" = one 5-char run = 2 chunks of 4
        assert_eq!(text_tokens("hello"), 2);
        // two runs, whitespace is free
        assert_eq!(text_tokens("hello world"), 4);
    }

    #[test]
    fn test_punctuation_costs_its_own_token() {
        // hello(2) + ','(1) + world(2) + '!'(1)
        assert_eq!(text_tokens("hello, world!"), 6);
    }

    #[test]
    fn test_code_adds_line_structure() {
        let code = "fn main() {\n    println!(\"hi\");\n}\n";
        let prose = text_tokens(code);
        assert_eq!(cost(&ContentPayload::Code(code.to_string())).unwrap(), prose + 3);
    }

    #[test]
    fn test_image_bands() {
        assert_eq!(image_tokens(512, 512), 85);
        assert_eq!(image_tokens(640, 480), 340);
        assert_eq!(image_tokens(2048, 100), 765);
        assert_eq!(image_tokens(4096, 4096), 1105);
    }

    #[test]
    fn test_list_sums_rendered_entries() {
        let entries = vec!["hello".to_string(), "world".to_string()];
        // each entry: 2 tokens + 2 overhead
        assert_eq!(list_tokens(&entries), 8);
        assert_eq!(cost(&ContentPayload::List(entries)).unwrap(), 8);
    }

    #[test]
    fn test_opaque_payload_is_unsupported() {
        let err = cost(&ContentPayload::Opaque {
            kind: "video/mp4".to_string(),
        })
        .unwrap_err();
        assert_eq!(
            err,
            TokenError::UnsupportedContentType {
                kind: "video/mp4".to_string()
            }
        );
    }

    #[test]
    fn test_cost_is_idempotent() {
        let payload = ContentPayload::Text("the same payload every time".to_string());
        assert_eq!(cost(&payload).unwrap(), cost(&payload).unwrap());
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
