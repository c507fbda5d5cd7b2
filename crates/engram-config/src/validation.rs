// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as weight ranges and chunk size ordering.

use thiserror::Error;

use crate::model::EngramConfig;

/// A single configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Validation { message: String },
}

/// Known provider selectors accepted by `[embedding] provider`.
const KNOWN_PROVIDERS: &[&str] = &["local", "remote", "custom", "noop", "auto"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &EngramConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let provider = config.embedding.provider.to_lowercase();
    if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "embedding.provider `{}` is not one of {KNOWN_PROVIDERS:?}",
                config.embedding.provider
            ),
        });
    }

    if config.embedding.batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.batch_size must be at least 1".to_string(),
        });
    }

    if config.embedding.dimension == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.dimension must be at least 1".to_string(),
        });
    }

    if config.chunker.max_chunk_size == 0 {
        errors.push(ConfigError::Validation {
            message: "chunker.max_chunk_size must be at least 1".to_string(),
        });
    }

    if config.chunker.min_chunk_size > config.chunker.max_chunk_size {
        errors.push(ConfigError::Validation {
            message: format!(
                "chunker.min_chunk_size ({}) must not exceed chunker.max_chunk_size ({})",
                config.chunker.min_chunk_size, config.chunker.max_chunk_size
            ),
        });
    }

    if config.chunker.overlap_chars >= config.chunker.max_chunk_size {
        errors.push(ConfigError::Validation {
            message: format!(
                "chunker.overlap_chars ({}) must be smaller than chunker.max_chunk_size ({})",
                config.chunker.overlap_chars, config.chunker.max_chunk_size
            ),
        });
    }

    for (name, value) in [
        ("search.vector_weight", config.search.vector_weight),
        ("search.keyword_weight", config.search.keyword_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::Validation {
                message: format!("{name} must be within [0.0, 1.0], got {value}"),
            });
        }
    }

    if config.search.min_score < 0.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "search.min_score must be non-negative, got {}",
                config.search.min_score
            ),
        });
    }

    if config.storage.db_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.db_name must not be empty".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
