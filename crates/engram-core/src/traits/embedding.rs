// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::EmbedError;

/// A pluggable source of fixed-dimension text embeddings.
///
/// Implementations power the vector half of hybrid memory search. Each
/// instance produces vectors of exactly one dimension; callers rely on
/// positional alignment between `texts` and the returned vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// The fixed dimension of vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Short provider name for logs and stats.
    fn name(&self) -> &'static str;
}
