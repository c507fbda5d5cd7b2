// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the hybrid memory search engine.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Open key/value metadata attached to chunks and search results.
pub type Metadata = Map<String, Value>;

/// A semantically bounded slice of a document, produced by the chunker.
///
/// Chunks are transient: they exist between a `chunk()` call and the
/// corresponding store upsert. Persistence (embedding column, search text,
/// timestamps) is owned exclusively by the store.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The chunk text itself.
    pub content: String,
    /// Breadcrumb of enclosing section titles, e.g. `"# A > ## B > ### C"`.
    pub heading_context: String,
    /// Opaque identifier of the originating document.
    pub source: String,
    /// 0-based position within the source.
    pub chunk_index: i64,
    /// Caller-supplied metadata, stored as JSON alongside the chunk.
    pub metadata: Metadata,
}

impl Chunk {
    /// Stable digest of `content`, used as the dedup and embedding-cache key.
    ///
    /// A pure function of the content: identical text under any source or
    /// index collapses to the same cache entry.
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }

    /// The text handed to the full-text index: heading context plus content.
    pub fn search_text(&self) -> String {
        if self.heading_context.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n{}", self.heading_context, self.content)
        }
    }

    /// Content length in characters (not bytes).
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// First 16 hex characters of the SHA-256 digest of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// A single hit from one of the store's search paths.
///
/// Carries both score fields so the engine can fuse vector and keyword hit
/// sets by chunk identity; the path that produced the hit fills in its own
/// score and leaves the other at 0.0.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub content: String,
    pub heading_context: String,
    pub source: String,
    pub chunk_index: i64,
    pub metadata: Metadata,
    /// Cosine similarity in [0, 1].
    pub vector_score: f64,
    /// BM25 relevance normalized to [0, 1] within its batch.
    pub keyword_score: f64,
    pub created_at: String,
}

/// A fused search result returned to callers of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySearchResult {
    pub content: String,
    pub heading_context: String,
    pub source: String,
    /// Weighted fusion of vector and keyword scores.
    pub score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub chunk_id: i64,
    pub metadata: Metadata,
}

impl MemorySearchResult {
    /// Display form used when injecting results into an agent's context.
    pub fn display_text(&self) -> String {
        if self.heading_context.is_empty() {
            self.content.clone()
        } else {
            format!("[{}]\n{}", self.heading_context, self.content)
        }
    }
}

/// A chunk row persisted without an embedding, awaiting backfill.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk_id: i64,
    pub source: String,
    pub chunk_index: i64,
    pub content: String,
    pub heading_context: String,
    pub content_hash: String,
    pub metadata: Metadata,
}

/// Per-source chunk accounting, from `get_all_sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub source: String,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub first_indexed: String,
    pub last_updated: String,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub missing_embeddings: usize,
    pub unique_sources: usize,
    pub cache_entries: usize,
    pub db_size_bytes: u64,
    pub db_path: String,
}

/// Engine-level statistics: store stats plus search mode observability.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub embedder: String,
    pub keyword_only: bool,
    pub consecutive_embed_failures: u32,
    pub vector_weight: f64,
    pub keyword_weight: f64,
}

/// Statistics returned by a full reindex pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexStats {
    pub files_indexed: usize,
    pub chunks_written: usize,
    pub sources_cleaned: usize,
    pub embeddings_backfilled: usize,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub store: StoreStats,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage (little-endian).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap_or([0; 4])))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Defined as 0.0 whenever either vector has zero norm, so all-zero
/// embeddings (the no-op provider) never match anything. Vectors of unequal
/// length compare over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(content: &str, source: &str, index: i64) -> Chunk {
        Chunk {
            content: content.to_string(),
            heading_context: String::new(),
            source: source.to_string(),
            chunk_index: index,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash("Python is a language.");
        let b = content_hash("Python is a language.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn content_hash_independent_of_source_and_index() {
        let c1 = make_chunk("same text", "a.md", 0);
        let c2 = make_chunk("same text", "b.md", 7);
        assert_eq!(c1.content_hash(), c2.content_hash());
    }

    #[test]
    fn content_hash_differs_for_different_content() {
        assert_ne!(content_hash("alpha"), content_hash("beta"));
    }

    #[test]
    fn search_text_includes_heading_context() {
        let mut chunk = make_chunk("body text", "a.md", 0);
        chunk.heading_context = "# Intro > ## Details".to_string();
        let text = chunk.search_text();
        assert!(text.starts_with("# Intro > ## Details\n"));
        assert!(text.ends_with("body text"));
    }

    #[test]
    fn search_text_without_heading_is_content() {
        let chunk = make_chunk("just text", "a.md", 0);
        assert_eq!(chunk.search_text(), "just text");
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let original: Vec<f32> = (0..384).map(|i| (i as f32 - 192.0) / 384.0).collect();
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), 384 * 4);
        let recovered = blob_to_vec(&blob);
        assert_eq!(recovered.len(), original.len());
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn blob_roundtrip_negative_and_extreme() {
        let original = vec![0.1_f32, -0.5, 1.0, f32::MIN_POSITIVE, -1e30];
        let recovered = blob_to_vec(&vec_to_blob(&original));
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < 1e-6 * a.abs().max(1.0));
        }
    }

    #[test]
    fn cosine_identical_vector_is_one() {
        let v = vec![0.3_f32, -0.7, 0.64, 0.02];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let v = vec![0.3_f32, -0.7, 0.64];
        let zero = vec![0.0_f32; 3];
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn cosine_opposite_is_negative_one() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![-1.0_f32, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn display_text_brackets_heading() {
        let result = MemorySearchResult {
            content: "body".to_string(),
            heading_context: "# Top".to_string(),
            source: "a.md".to_string(),
            score: 0.5,
            vector_score: 0.5,
            keyword_score: 0.0,
            chunk_id: 1,
            metadata: Metadata::new(),
        };
        assert_eq!(result.display_text(), "[# Top]\nbody");
    }
}
