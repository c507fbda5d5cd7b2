// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX embedding inference and the process-wide model registry.
//!
//! [`OnnxModel`] wraps an ONNX Runtime session plus its HuggingFace
//! tokenizer and produces L2-normalized embeddings via attention-masked mean
//! pooling. [`ModelRegistry`] is the explicit, injectable cache that shares
//! loaded models across provider instances: the process owns one registry
//! and passes it by `Arc` wherever local embedding is constructed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info};

use engram_core::EmbedError;

/// Inference device for local embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

/// Resolve the configured device string to a concrete device.
///
/// `auto` picks CUDA only when the crate was built with the `cuda` feature;
/// an explicit `cuda` request without that feature falls back to CPU with a
/// warning rather than failing.
pub fn resolve_device(device: &str) -> Device {
    match device.to_lowercase().as_str() {
        "cpu" => Device::Cpu,
        "cuda" => {
            if cfg!(feature = "cuda") {
                Device::Cuda
            } else {
                tracing::warn!("device=cuda requested but the `cuda` feature is not enabled, using CPU");
                Device::Cpu
            }
        }
        _ => {
            if cfg!(feature = "cuda") {
                Device::Cuda
            } else {
                Device::Cpu
            }
        }
    }
}

/// A loaded ONNX embedding model.
///
/// All inference runs on the configured device with a single intra-op
/// thread. The session is not `Send`; the mutex provides the needed
/// synchronization.
pub struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Safety: Session is only accessed through the Mutex, which provides
// synchronization. The tokenizer is thread-safe for encoding operations.
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

impl OnnxModel {
    /// Loads a model from `model.onnx`, expecting `tokenizer.json` in the
    /// same directory.
    pub fn load(model_path: &Path, device: Device) -> Result<Self, EmbedError> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| EmbedError::Inference("invalid model path".to_string()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            EmbedError::Inference(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let builder = Session::builder()
            .map_err(|e| EmbedError::Inference(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EmbedError::Inference(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| EmbedError::Inference(format!("failed to set thread count: {e}")))?;

        #[cfg(feature = "cuda")]
        let builder = if device == Device::Cuda {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| {
                    EmbedError::Inference(format!("failed to register CUDA provider: {e}"))
                })?
        } else {
            builder
        };
        #[cfg(not(feature = "cuda"))]
        let _ = device;

        let session = builder.commit_from_file(model_path).map_err(|e| {
            EmbedError::Inference(format!(
                "failed to load ONNX model from {}: {e}",
                model_path.display()
            ))
        })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed a single text, returning an L2-normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::Inference(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let seq_len = input_ids.len();

        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| EmbedError::Inference(format!("failed to create input_ids tensor: {e}")))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| {
                EmbedError::Inference(format!("failed to create attention_mask tensor: {e}"))
            })?;
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| {
                EmbedError::Inference(format!("failed to create token_type_ids tensor: {e}"))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedError::Inference(format!("failed to lock ONNX session: {e}")))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array)
            .map_err(|e| EmbedError::Inference(format!("failed to create input_ids TensorRef: {e}")))?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask_array)
            .map_err(|e| {
                EmbedError::Inference(format!("failed to create attention_mask TensorRef: {e}"))
            })?;
        let token_type_ids_tensor = TensorRef::from_array_view(&token_type_ids_array)
            .map_err(|e| {
                EmbedError::Inference(format!("failed to create token_type_ids TensorRef: {e}"))
            })?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| EmbedError::Inference(format!("ONNX inference failed: {e}")))?;

        // Output shape: [1, seq_len, hidden_size]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Inference(format!("failed to extract output tensor: {e}")))?;

        let hidden_size = shape[shape.len() - 1] as usize;
        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);

        Ok(l2_normalize(&pooled))
    }
}

/// Explicit process-wide registry of loaded models.
///
/// Replaces an implicit global: the owning process constructs one registry
/// and injects it into every engine, so repeated provider instances for the
/// same model name share a single loaded session.
#[derive(Default)]
pub struct ModelRegistry {
    models: Mutex<HashMap<String, Arc<OnnxModel>>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loaded model for `name`, loading it from `model_path` on
    /// first use.
    pub fn get_or_load(
        &self,
        name: &str,
        model_path: &Path,
        device: Device,
    ) -> Result<Arc<OnnxModel>, EmbedError> {
        let mut models = self
            .models
            .lock()
            .map_err(|e| EmbedError::Inference(format!("model registry lock poisoned: {e}")))?;

        if let Some(model) = models.get(name) {
            debug!(model = name, "reusing cached embedding model");
            return Ok(Arc::clone(model));
        }

        info!(model = name, device = ?device, "loading local embedding model");
        let loaded = Arc::new(OnnxModel::load(model_path, device)?);
        models.insert(name.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Number of models currently loaded.
    pub fn len(&self) -> usize {
        self.models.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// True when no model has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for i in 0..seq_len {
        if attention_mask[i] > 0 {
            for j in 0..hidden_size {
                sum[j] += embeddings[i * hidden_size + j];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    sum
}

/// L2-normalize a vector.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_vector() {
        let v = vec![1.0, 0.0, 0.0];
        let n = l2_normalize(&v);
        assert!((n[0] - 1.0).abs() < f32::EPSILON);
        assert!(n[1].abs() < f32::EPSILON);
    }

    #[test]
    fn l2_normalize_general_vector() {
        let v = vec![3.0, 4.0];
        let n = l2_normalize(&v);
        assert!((n[0] - 0.6).abs() < 0.001);
        assert!((n[1] - 0.8).abs() < 0.001);
        let norm: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let v = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&v), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn mean_pool_skips_padding_tokens() {
        // 2 tokens, hidden_size=3, first token masked out (padding)
        let embeddings = vec![
            9.0, 9.0, 9.0, // token 0 (padding)
            1.0, 2.0, 3.0, // token 1 (real)
        ];
        let attention_mask = vec![0, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 2, 3);
        assert_eq!(result, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_pool_averages_real_tokens() {
        let embeddings = vec![
            1.0, 2.0, // token 0
            3.0, 4.0, // token 1
            5.0, 6.0, // token 2
        ];
        let attention_mask = vec![1, 1, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 3, 2);
        assert!((result[0] - 3.0).abs() < f32::EPSILON);
        assert!((result[1] - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn mean_pool_all_masked_is_zero() {
        let embeddings = vec![1.0, 2.0, 3.0, 4.0];
        let attention_mask = vec![0, 0];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 2, 2);
        assert_eq!(result, vec![0.0, 0.0]);
    }

    #[test]
    fn resolve_device_cpu_is_explicit() {
        assert_eq!(resolve_device("cpu"), Device::Cpu);
        assert_eq!(resolve_device("CPU"), Device::Cpu);
    }

    #[test]
    fn resolve_device_auto_without_cuda_feature_is_cpu() {
        if !cfg!(feature = "cuda") {
            assert_eq!(resolve_device("auto"), Device::Cpu);
            assert_eq!(resolve_device("cuda"), Device::Cpu);
        }
    }

    #[test]
    fn registry_load_failure_for_missing_files() {
        let registry = ModelRegistry::new();
        let err = registry
            .get_or_load("missing", Path::new("/nonexistent/model.onnx"), Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, EmbedError::Inference(_)));
        assert!(registry.is_empty());
    }

    // OnnxModel::load and embed_text need real model files on disk;
    // inference is covered by integration runs with a downloaded model.
}
