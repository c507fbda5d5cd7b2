// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram memory engine.
//!
//! Provides the foundational error types and the [`EmbeddingProvider`]
//! trait shared by the Engram workspace crates.

pub mod error;
pub mod traits;

// Re-export key items at crate root for ergonomic imports.
pub use error::{EmbedError, EngramError};
pub use traits::EmbeddingProvider;
