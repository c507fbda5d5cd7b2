// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory engine.

use thiserror::Error;

/// The primary error type used across all Engram crates.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Embedding failures surfaced past the engine's degrade handling.
    #[error(transparent)]
    Embedding(#[from] EmbedError),

    /// The local embedding model was explicitly requested but cannot be
    /// obtained. The one fatal misconfiguration: there is no safe automatic
    /// substitute once the local path was asked for by name.
    #[error("local embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Typed failure returned by [`crate::traits::EmbeddingProvider::embed`].
///
/// These are recoverable at the engine level: a failed embed call falls back
/// to keyword-only search and counts toward the degrade threshold.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Network, auth, or HTTP-level failure talking to a remote provider.
    #[error("embedding request failed: {message}")]
    Request {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider answered but the response could not be used
    /// (wrong count, missing fields, unparseable body).
    #[error("embedding response malformed: {0}")]
    Malformed(String),

    /// Local model load or inference failure.
    #[error("local embedding inference failed: {0}")]
    Inference(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engram_error_has_all_variants() {
        let _config = EngramError::Config("test".into());
        let _storage = EngramError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _embedding = EngramError::Embedding(EmbedError::Malformed("test".into()));
        let _model = EngramError::ModelUnavailable("test".into());
        let _internal = EngramError::Internal("test".into());
    }

    #[test]
    fn embed_error_converts_into_engram_error() {
        let embed = EmbedError::Request {
            message: "connection refused".into(),
            source: None,
        };
        let err: EngramError = embed.into();
        assert!(matches!(err, EngramError::Embedding(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn error_messages_are_actionable() {
        let err = EngramError::ModelUnavailable(
            "model files missing under memory/models/all-MiniLM-L6-v2".into(),
        );
        assert!(err.to_string().starts_with("local embedding model unavailable"));
    }
}
