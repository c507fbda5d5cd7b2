// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model download manager for first-run ONNX embedding model setup.
//!
//! Downloads the embedding model and tokenizer from HuggingFace on first
//! run and caches them under `memory/models/<name>/` in the workspace.

use std::path::{Path, PathBuf};

use engram_core::EngramError;
use tokio::sync::Mutex;
use tracing::info;

/// Download URLs for models Engram knows how to fetch.
///
/// Other models can still be used by placing `model.onnx` and
/// `tokenizer.json` in the model directory by hand.
const KNOWN_DOWNLOADS: &[(&str, &str, &str)] = &[(
    "all-MiniLM-L6-v2",
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx",
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json",
)];

/// Embedding dimensions for common local models, so `dimension()` can answer
/// without loading anything.
const KNOWN_DIMS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("all-mpnet-base-v2", 768),
    ("paraphrase-multilingual-MiniLM-L12-v2", 384),
    ("shibing624/text2vec-base-chinese", 768),
    ("BAAI/bge-small-zh-v1.5", 512),
    ("BAAI/bge-base-zh-v1.5", 768),
    ("BAAI/bge-small-en-v1.5", 384),
];

/// Reported dimension for a known local model name, without loading it.
pub fn known_dimension(model: &str) -> Option<usize> {
    KNOWN_DIMS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dim)| *dim)
}

/// Manages ONNX model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    /// Serializes downloads so concurrent callers never race on partial files.
    download_lock: Mutex<()>,
}

impl ModelManager {
    /// Creates a new ModelManager rooted at the given data directory
    /// (normally the workspace `memory/` directory).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            download_lock: Mutex::new(()),
        }
    }

    /// Directory holding the files for `model` (slashes in HuggingFace
    /// repo names are flattened).
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.data_dir.join("models").join(model.replace('/', "--"))
    }

    /// Path to the ONNX model file.
    pub fn model_path(&self, model: &str) -> PathBuf {
        self.model_dir(model).join("model.onnx")
    }

    /// Path to the tokenizer.json file.
    pub fn tokenizer_path(&self, model: &str) -> PathBuf {
        self.model_dir(model).join("tokenizer.json")
    }

    /// Returns true if both model and tokenizer files exist on disk.
    pub fn is_model_available(&self, model: &str) -> bool {
        self.model_path(model).exists() && self.tokenizer_path(model).exists()
    }

    /// Ensures the model is downloaded and available, returning the model path.
    ///
    /// Downloads from HuggingFace on first run; subsequent calls are no-ops.
    /// Fails with [`EngramError::ModelUnavailable`] when the model is neither
    /// on disk nor downloadable; this is the engine's one fatal
    /// misconfiguration when the local provider was explicitly requested.
    pub async fn ensure_model(&self, model: &str) -> Result<PathBuf, EngramError> {
        if self.is_model_available(model) {
            return Ok(self.model_path(model));
        }

        let Some((_, model_url, tokenizer_url)) = KNOWN_DOWNLOADS
            .iter()
            .find(|(name, _, _)| *name == model)
        else {
            return Err(EngramError::ModelUnavailable(format!(
                "no download source for `{model}`; place model.onnx and tokenizer.json under {}",
                self.model_dir(model).display()
            )));
        };

        let _guard = self.download_lock.lock().await;
        if self.is_model_available(model) {
            return Ok(self.model_path(model));
        }

        info!(model, "embedding model not found, downloading from HuggingFace");

        let model_dir = self.model_dir(model);
        tokio::fs::create_dir_all(&model_dir).await.map_err(|e| {
            EngramError::ModelUnavailable(format!(
                "failed to create model directory {}: {e}",
                model_dir.display()
            ))
        })?;

        let files = [("model.onnx", *model_url), ("tokenizer.json", *tokenizer_url)];

        for (filename, url) in files {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }

            info!(filename, "downloading model file");
            match download_file(url, &dest).await {
                Ok(size) => info!(filename, size, "downloaded model file"),
                Err(e) => {
                    // Clean up partial download
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
            }
        }

        info!(dir = %model_dir.display(), "embedding model ready");
        Ok(self.model_path(model))
    }
}

/// Download a file from a URL to a local path, returning its size.
async fn download_file(url: &str, dest: &Path) -> Result<usize, EngramError> {
    let response = reqwest::get(url).await.map_err(|e| {
        EngramError::ModelUnavailable(format!("failed to download {url}: {e}"))
    })?;

    if !response.status().is_success() {
        return Err(EngramError::ModelUnavailable(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response.bytes().await.map_err(|e| {
        EngramError::ModelUnavailable(format!("failed to read response body from {url}: {e}"))
    })?;

    let size = bytes.len();
    tokio::fs::write(dest, &bytes).await.map_err(|e| {
        EngramError::ModelUnavailable(format!("failed to write {}: {e}", dest.display()))
    })?;

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_under_data_dir() {
        let mgr = ModelManager::new(PathBuf::from("/tmp/engram/memory"));
        assert_eq!(
            mgr.model_path("all-MiniLM-L6-v2"),
            PathBuf::from("/tmp/engram/memory/models/all-MiniLM-L6-v2/model.onnx")
        );
        assert_eq!(
            mgr.tokenizer_path("all-MiniLM-L6-v2"),
            PathBuf::from("/tmp/engram/memory/models/all-MiniLM-L6-v2/tokenizer.json")
        );
    }

    #[test]
    fn slashed_model_names_are_flattened() {
        let mgr = ModelManager::new(PathBuf::from("/data"));
        assert_eq!(
            mgr.model_dir("BAAI/bge-small-en-v1.5"),
            PathBuf::from("/data/models/BAAI--bge-small-en-v1.5")
        );
    }

    #[test]
    fn model_not_available_when_missing() {
        let mgr = ModelManager::new(PathBuf::from("/nonexistent/path"));
        assert!(!mgr.is_model_available("all-MiniLM-L6-v2"));
    }

    #[test]
    fn known_dimension_table() {
        assert_eq!(known_dimension("all-MiniLM-L6-v2"), Some(384));
        assert_eq!(known_dimension("all-mpnet-base-v2"), Some(768));
        assert_eq!(known_dimension("BAAI/bge-small-zh-v1.5"), Some(512));
        assert_eq!(known_dimension("made-up-model"), None);
    }

    #[tokio::test]
    async fn ensure_model_fails_actionably_for_unknown_model() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(tmp.path().to_path_buf());
        let err = mgr.ensure_model("made-up-model").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("made-up-model"));
        assert!(msg.contains("model.onnx"));
    }
}
