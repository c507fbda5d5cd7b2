// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid memory search engine for LLM agents.
//!
//! Turns free-form notes and transcripts into retrievable, ranked snippets:
//! a markdown-aware chunker, pluggable embedding providers, and a
//! single-file SQLite store serving both cosine-similarity vector search
//! and FTS5/BM25 keyword search, fused into one ranked result list with
//! incremental, idempotent re-indexing.
//!
//! ## Architecture
//!
//! - **MarkdownChunker**: heading-aware splitting with breadcrumb context
//! - **EmbeddingProvider impls**: local ONNX, OpenAI-compatible remote,
//!   custom endpoint, and a zero-vector no-op
//! - **ModelRegistry / ModelManager**: shared loaded models and first-run
//!   model download
//! - **VectorStore**: SQLite persistence with BLOB vectors, an FTS5 mirror,
//!   and a content-hash embedding cache
//! - **MemorySearchEngine**: indexing, hybrid search, score fusion, and the
//!   one-way keyword-only degrade policy

pub mod chunker;
pub mod embedder;
pub mod engine;
pub mod migrations;
pub mod model_manager;
pub mod provider;
pub mod store;
pub mod types;

pub use chunker::MarkdownChunker;
pub use embedder::{Device, ModelRegistry, OnnxModel};
pub use engine::{DegradeSupervisor, MemorySearchEngine, SearchMode};
pub use model_manager::ModelManager;
pub use provider::{
    CustomEmbedding, LocalEmbedding, NoopEmbedding, ProviderSpec, RemoteEmbedding,
};
pub use store::VectorStore;
pub use types::*;
