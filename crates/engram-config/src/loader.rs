// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./engram.toml` > `~/.config/engram/engram.toml` >
//! `/etc/engram/engram.toml` with environment variable overrides via the
//! `ENGRAM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::EngramConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/engram/engram.toml` (system-wide)
/// 3. `~/.config/engram/engram.toml` (user XDG config)
/// 4. `./engram.toml` (local directory)
/// 5. `ENGRAM_*` environment variables
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("/etc/engram/engram.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engram/engram.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ENGRAM_EMBEDDING_API_KEY` must map to
/// `embedding.api_key`, not `embedding.api.key`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: ENGRAM_EMBEDDING_API_KEY -> "embedding_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("embedding_", "embedding.", 1)
            .replacen("chunker_", "chunker.", 1)
            .replacen("search_", "search.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.embedding.provider, "auto");
        assert_eq!(config.search.top_k, 5);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = load_config_from_str(
            r#"
            [embedding]
            provider = "noop"
            dimension = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.provider, "noop");
        assert_eq!(config.embedding.dimension, 64);
        // Untouched sections keep their defaults.
        assert_eq!(config.chunker.max_chunk_size, 1200);
        assert!((config.search.vector_weight - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [search]
            vectorweight = 0.9
            "#,
        );
        assert!(result.is_err(), "deny_unknown_fields should reject typos");
    }

    #[test]
    fn weights_can_be_overridden() {
        let config = load_config_from_str(
            r#"
            [search]
            vector_weight = 0.8
            keyword_weight = 0.2
            min_score = 0.0
            "#,
        )
        .unwrap();
        assert!((config.search.vector_weight - 0.8).abs() < f64::EPSILON);
        assert!((config.search.keyword_weight - 0.2).abs() < f64::EPSILON);
        assert!(config.search.min_score.abs() < f64::EPSILON);
    }
}
