// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunker segmentation settings.
    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Hybrid search weighting and thresholds.
    #[serde(default)]
    pub search: SearchConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Embedding provider configuration.
///
/// The raw keys here are resolved once, at engine construction, into a
/// concrete provider variant; they are never re-read at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Provider selection: `local`, `remote`, `custom`, `noop`, or `auto`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Embedding model name (local model directory name, or remote model id).
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Device for local inference: `cpu` or `auto`.
    #[serde(default = "default_device")]
    pub device: String,

    /// API key for remote providers. `None` disables remote resolution.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override for remote providers, or the endpoint for `custom`.
    #[serde(default)]
    pub api_base: Option<String>,

    /// Vector dimension for providers that cannot report one themselves
    /// (`noop`, and `custom` before the first response).
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            device: default_device(),
            api_key: None,
            api_base: None,
            dimension: default_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> String {
    "auto".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    64
}

/// Chunker segmentation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk. Longer sections re-split at sentence
    /// boundaries.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Minimum characters per chunk. Shorter sections merge into the
    /// previous chunk when the merge fits.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Characters of overlap carried between adjacent sub-chunks.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1200
}

fn default_min_chunk_size() -> usize {
    100
}

fn default_overlap_chars() -> usize {
    50
}

/// Hybrid search weighting and thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Weight of the vector similarity score in the fused ranking.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    /// Weight of the keyword (BM25) score in the fused ranking.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Default number of results returned by `search`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Fused scores below this threshold are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.6
}

fn default_keyword_weight() -> f64 {
    0.4
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f64 {
    0.1
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Database file name, created under the workspace `memory/` directory.
    #[serde(default = "default_db_name")]
    pub db_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_name: default_db_name(),
        }
    }
}

fn default_db_name() -> String {
    "memory_search.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngramConfig::default();
        assert_eq!(config.embedding.provider, "auto");
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.chunker.max_chunk_size, 1200);
        assert_eq!(config.chunker.min_chunk_size, 100);
        assert_eq!(config.chunker.overlap_chars, 50);
        assert!((config.search.vector_weight - 0.6).abs() < f64::EPSILON);
        assert!((config.search.keyword_weight - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.search.top_k, 5);
        assert!((config.search.min_score - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.storage.db_name, "memory_search.db");
    }

    #[test]
    fn optional_remote_fields_default_to_none() {
        let config = EmbeddingConfig::default();
        assert!(config.api_key.is_none());
        assert!(config.api_base.is_none());
    }
}
