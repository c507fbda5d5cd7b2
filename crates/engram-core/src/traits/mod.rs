// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions implemented by pluggable Engram components.

pub mod embedding;

pub use embedding::EmbeddingProvider;
