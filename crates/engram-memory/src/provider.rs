// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable embedding providers and their construction-time resolution.
//!
//! The raw `[embedding]` config is resolved exactly once into a
//! [`ProviderSpec`], a tagged union where each variant carries only the
//! fields it needs, and the spec is then built into a concrete
//! [`EmbeddingProvider`]. Misconfiguration (remote without a key, custom
//! without an endpoint) degrades to the no-op provider with a logged
//! warning; only an explicitly requested but unobtainable local model is
//! allowed to fail construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use engram_config::EmbeddingConfig;
use engram_core::{EmbedError, EmbeddingProvider, EngramError};

use crate::embedder::{resolve_device, ModelRegistry, OnnxModel};
use crate::model_manager::{known_dimension, ModelManager};

/// Fallback dimension for local models not in the known-dimension table.
const DEFAULT_LOCAL_DIM: usize = 384;

/// Default dimension for remote models before the first response arrives.
const DEFAULT_REMOTE_DIM: usize = 1536;

/// Known dimensions for common remote embedding models.
const REMOTE_KNOWN_DIMS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

/// A fully resolved provider selection.
///
/// Resolution happens once, at engine construction; nothing re-reads the
/// raw config afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSpec {
    Local {
        model: String,
        device: String,
        batch_size: usize,
    },
    Remote {
        model: String,
        api_key: String,
        api_base: Option<String>,
        batch_size: usize,
    },
    Custom {
        url: String,
        model: String,
        api_key: Option<String>,
        dimension: usize,
        batch_size: usize,
    },
    Noop {
        dimension: usize,
    },
}

impl ProviderSpec {
    /// Resolve the raw embedding config into a concrete provider variant.
    ///
    /// `auto` prefers local when the model files are already on disk, then a
    /// remote provider when an API key is configured, and otherwise falls
    /// back to no-op with a warning. Never fails: misconfiguration of the
    /// remote variants degrades to [`ProviderSpec::Noop`].
    pub fn resolve(config: &EmbeddingConfig, models: &ModelManager) -> ProviderSpec {
        match config.provider.to_lowercase().as_str() {
            "local" => ProviderSpec::Local {
                model: config.model.clone(),
                device: config.device.clone(),
                batch_size: config.batch_size,
            },
            "remote" => match &config.api_key {
                Some(key) if !key.is_empty() => ProviderSpec::Remote {
                    model: config.model.clone(),
                    api_key: key.clone(),
                    api_base: config.api_base.clone(),
                    batch_size: config.batch_size,
                },
                _ => {
                    warn!("remote embedding configured without api_key, falling back to noop (keyword-only mode)");
                    ProviderSpec::Noop {
                        dimension: config.dimension,
                    }
                }
            },
            "custom" => match &config.api_base {
                Some(base) if !base.is_empty() => ProviderSpec::Custom {
                    url: base.clone(),
                    model: config.model.clone(),
                    api_key: config.api_key.clone(),
                    dimension: config.dimension,
                    batch_size: config.batch_size,
                },
                _ => {
                    warn!("custom embedding configured without api_base, falling back to noop (keyword-only mode)");
                    ProviderSpec::Noop {
                        dimension: config.dimension,
                    }
                }
            },
            "noop" => ProviderSpec::Noop {
                dimension: config.dimension,
            },
            other => {
                if other != "auto" {
                    warn!(provider = other, "unknown embedding provider, treating as auto");
                }
                Self::resolve_auto(config, models)
            }
        }
    }

    /// Auto mode: local model files on disk > configured remote key > noop.
    fn resolve_auto(config: &EmbeddingConfig, models: &ModelManager) -> ProviderSpec {
        if models.is_model_available(&config.model) {
            info!(model = %config.model, "auto-resolved embedding provider: local");
            return ProviderSpec::Local {
                model: config.model.clone(),
                device: config.device.clone(),
                batch_size: config.batch_size,
            };
        }

        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            info!("auto-resolved embedding provider: remote");
            return ProviderSpec::Remote {
                model: config.model.clone(),
                api_key: key.to_string(),
                api_base: config.api_base.clone(),
                batch_size: config.batch_size,
            };
        }

        warn!("no embedding backend available, using noop (keyword-only mode)");
        ProviderSpec::Noop {
            dimension: config.dimension,
        }
    }

    /// True when this spec is the no-op variant.
    pub fn is_noop(&self) -> bool {
        matches!(self, ProviderSpec::Noop { .. })
    }
}

/// Build a provider from a resolved spec.
///
/// Local models must already be on disk (the engine runs
/// [`ModelManager::ensure_model`] beforehand); HTTP client construction
/// failures for the remote variants degrade to no-op.
pub fn build_provider(
    spec: &ProviderSpec,
    registry: Arc<ModelRegistry>,
    models: Arc<ModelManager>,
) -> Arc<dyn EmbeddingProvider> {
    match spec {
        ProviderSpec::Local {
            model,
            device,
            // Local inference runs one text at a time; the batch size only
            // matters for the HTTP providers.
            batch_size: _,
        } => Arc::new(LocalEmbedding::new(
            model.clone(),
            device.clone(),
            registry,
            models,
        )),
        ProviderSpec::Remote {
            model,
            api_key,
            api_base,
            batch_size,
        } => match RemoteEmbedding::new(model.clone(), api_key, api_base.clone(), *batch_size) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                warn!(error = %e, "failed to build remote embedding client, falling back to noop");
                Arc::new(NoopEmbedding::new(DEFAULT_REMOTE_DIM))
            }
        },
        ProviderSpec::Custom {
            url,
            model,
            api_key,
            dimension,
            batch_size,
        } => match CustomEmbedding::new(
            url.clone(),
            model.clone(),
            api_key.clone(),
            *dimension,
            *batch_size,
        ) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                warn!(error = %e, "failed to build custom embedding client, falling back to noop");
                Arc::new(NoopEmbedding::new(*dimension))
            }
        },
        ProviderSpec::Noop { dimension } => Arc::new(NoopEmbedding::new(*dimension)),
    }
}

// --- Local (ONNX) ---

/// Local ONNX embedding backend.
///
/// Lazy: the model is loaded through the shared registry on the first
/// `embed` call, so constructing the provider never blocks on model load.
pub struct LocalEmbedding {
    model_name: String,
    device: String,
    registry: Arc<ModelRegistry>,
    models: Arc<ModelManager>,
}

impl LocalEmbedding {
    pub fn new(
        model_name: String,
        device: String,
        registry: Arc<ModelRegistry>,
        models: Arc<ModelManager>,
    ) -> Self {
        Self {
            model_name,
            device,
            registry,
            models,
        }
    }

    fn load_model(&self) -> Result<Arc<OnnxModel>, EmbedError> {
        let model_path = self.models.model_path(&self.model_name);
        let device = resolve_device(&self.device);
        self.registry
            .get_or_load(&self.model_name, &model_path, device)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let model = self.load_model()?;
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(model.embed_text(text)?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        known_dimension(&self.model_name).unwrap_or(DEFAULT_LOCAL_DIM)
    }

    fn name(&self) -> &'static str {
        "local-onnx"
    }
}

// --- OpenAI-compatible wire format ---

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

/// POST one batch to an OpenAI-compatible `/embeddings` endpoint.
async fn post_embeddings(
    client: &reqwest::Client,
    endpoint: &str,
    model: &str,
    batch: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let request = EmbeddingRequest { model, input: batch };

    let response = client
        .post(endpoint)
        .json(&request)
        .send()
        .await
        .map_err(|e| EmbedError::Request {
            message: format!("HTTP request to {endpoint} failed: {e}"),
            source: Some(Box::new(e)),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbedError::Request {
            message: format!("embedding endpoint returned {status}: {body}"),
            source: None,
        });
    }

    let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
        EmbedError::Malformed(format!("failed to parse embedding response: {e}"))
    })?;

    // Responses are index-tagged; re-sort to restore input order.
    parsed.data.sort_by_key(|entry| entry.index);

    if parsed.data.len() != batch.len() {
        return Err(EmbedError::Malformed(format!(
            "endpoint returned {} embeddings for {} inputs",
            parsed.data.len(),
            batch.len()
        )));
    }

    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

fn embedding_headers(api_key: Option<&str>) -> Result<HeaderMap, EngramError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let auth = format!("Bearer {key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| EngramError::Config(format!("invalid API key header value: {e}")))?,
        );
    }
    Ok(headers)
}

// --- Remote (OpenAI-compatible API) ---

/// Remote embedding backend against an OpenAI-compatible embeddings API.
///
/// Requests are batched at `batch_size`; the vector dimension is
/// auto-detected from the first successful response when the model is not
/// in the known-dimension table.
pub struct RemoteEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    /// 0 until the first response reveals the dimension.
    detected_dimension: AtomicUsize,
}

impl RemoteEmbedding {
    pub fn new(
        model: String,
        api_key: &str,
        api_base: Option<String>,
        batch_size: usize,
    ) -> Result<Self, EngramError> {
        let headers = embedding_headers(Some(api_key))?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EngramError::Config(format!("failed to build HTTP client: {e}")))?;

        let base = api_base.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let endpoint = format!("{}/embeddings", base.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model,
            batch_size: batch_size.max(1),
            detected_dimension: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = post_embeddings(&self.client, &self.endpoint, &self.model, batch).await?;

            if self.detected_dimension.load(Ordering::Relaxed) == 0 {
                if let Some(first) = embeddings.first() {
                    self.detected_dimension.store(first.len(), Ordering::Relaxed);
                    info!(
                        dimension = first.len(),
                        model = %self.model,
                        "remote embedding dimension auto-detected"
                    );
                }
            }

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        let detected = self.detected_dimension.load(Ordering::Relaxed);
        if detected > 0 {
            return detected;
        }
        REMOTE_KNOWN_DIMS
            .iter()
            .find(|(name, _)| *name == self.model)
            .map(|(_, dim)| *dim)
            .unwrap_or(DEFAULT_REMOTE_DIM)
    }

    fn name(&self) -> &'static str {
        "remote-openai"
    }
}

// --- Custom endpoint ---

/// Embedding backend for self-hosted OpenAI-compatible services
/// (infinity, TEI, vLLM embed, ...).
pub struct CustomEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    dimension: AtomicUsize,
}

impl CustomEmbedding {
    pub fn new(
        url: String,
        model: String,
        api_key: Option<String>,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self, EngramError> {
        let headers = embedding_headers(api_key.as_deref().filter(|k| !k.is_empty()))?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EngramError::Config(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/embeddings", url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model,
            batch_size: batch_size.max(1),
            dimension: AtomicUsize::new(dimension),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for CustomEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = post_embeddings(&self.client, &self.endpoint, &self.model, batch).await?;

            if let Some(first) = embeddings.first() {
                if first.len() != self.dimension.load(Ordering::Relaxed) {
                    self.dimension.store(first.len(), Ordering::Relaxed);
                    info!(dimension = first.len(), "custom embedding dimension updated");
                }
            }

            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "custom-url"
    }
}

// --- No-op ---

/// Zero-vector embedding: pure keyword mode.
///
/// Never performs I/O. Used when no embedding backend is configured, which
/// turns the engine into a pure keyword index (all-zero query vectors
/// short-circuit vector search to empty).
pub struct NoopEmbedding {
    dimension: usize,
}

impl NoopEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(vec![vec![0.0; self.dimension]; texts.len()])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            ..EmbeddingConfig::default()
        }
    }

    fn manager() -> ModelManager {
        ModelManager::new(std::path::PathBuf::from("/nonexistent/engram-test"))
    }

    #[tokio::test]
    async fn noop_returns_zero_vectors() {
        let provider = NoopEmbedding::new(8);
        let out = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.len() == 8));
        assert!(out.iter().flatten().all(|x| *x == 0.0));
        assert_eq!(provider.dimension(), 8);
        assert_eq!(provider.name(), "noop");
    }

    #[test]
    fn resolve_explicit_noop() {
        let spec = ProviderSpec::resolve(&config("noop"), &manager());
        assert_eq!(spec, ProviderSpec::Noop { dimension: 384 });
    }

    #[test]
    fn resolve_remote_without_key_degrades_to_noop() {
        let spec = ProviderSpec::resolve(&config("remote"), &manager());
        assert!(spec.is_noop());
    }

    #[test]
    fn resolve_remote_with_key() {
        let mut cfg = config("remote");
        cfg.api_key = Some("sk-test".to_string());
        let spec = ProviderSpec::resolve(&cfg, &manager());
        assert!(matches!(spec, ProviderSpec::Remote { ref api_key, .. } if api_key == "sk-test"));
    }

    #[test]
    fn resolve_custom_without_base_degrades_to_noop() {
        let spec = ProviderSpec::resolve(&config("custom"), &manager());
        assert!(spec.is_noop());
    }

    #[test]
    fn resolve_custom_with_base() {
        let mut cfg = config("custom");
        cfg.api_base = Some("http://localhost:7997".to_string());
        cfg.dimension = 1024;
        let spec = ProviderSpec::resolve(&cfg, &manager());
        assert!(matches!(spec, ProviderSpec::Custom { dimension: 1024, .. }));
    }

    #[test]
    fn resolve_auto_no_backends_is_noop() {
        let spec = ProviderSpec::resolve(&config("auto"), &manager());
        assert!(spec.is_noop());
    }

    #[test]
    fn resolve_auto_with_key_prefers_remote() {
        let mut cfg = config("auto");
        cfg.api_key = Some("sk-test".to_string());
        let spec = ProviderSpec::resolve(&cfg, &manager());
        assert!(matches!(spec, ProviderSpec::Remote { .. }));
    }

    #[test]
    fn resolve_auto_with_model_on_disk_prefers_local() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(tmp.path().to_path_buf());
        let dir = mgr.model_dir("all-MiniLM-L6-v2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("model.onnx"), b"stub").unwrap();
        std::fs::write(dir.join("tokenizer.json"), b"{}").unwrap();

        let mut cfg = config("auto");
        cfg.api_key = Some("sk-test".to_string());
        let spec = ProviderSpec::resolve(&cfg, &mgr);
        assert!(matches!(spec, ProviderSpec::Local { .. }));
    }

    #[test]
    fn resolve_explicit_local_never_degrades() {
        // Even with nothing on disk: the fatal check happens at engine
        // construction, not at resolution.
        let spec = ProviderSpec::resolve(&config("local"), &manager());
        assert!(matches!(spec, ProviderSpec::Local { .. }));
    }

    #[test]
    fn local_dimension_known_without_loading() {
        let provider = LocalEmbedding::new(
            "all-mpnet-base-v2".to_string(),
            "cpu".to_string(),
            Arc::new(ModelRegistry::new()),
            Arc::new(manager()),
        );
        assert_eq!(provider.dimension(), 768);
    }

    #[test]
    fn remote_dimension_known_models_and_default() {
        let provider =
            RemoteEmbedding::new("text-embedding-3-large".to_string(), "sk-x", None, 64).unwrap();
        assert_eq!(provider.dimension(), 3072);
        let provider =
            RemoteEmbedding::new("unknown-model".to_string(), "sk-x", None, 64).unwrap();
        assert_eq!(provider.dimension(), 1536);
    }

    fn embedding_body(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "index": i,
                    "embedding": vec![0.5_f32; dim],
                })
            })
            .collect();
        serde_json::json!({ "data": data })
    }

    #[tokio::test]
    async fn remote_embed_detects_dimension_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(3, 2)))
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "custom-model".to_string(),
            "sk-test",
            Some(server.uri()),
            64,
        )
        .unwrap();

        let out = provider
            .embed(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 3);
        assert_eq!(provider.dimension(), 3);
    }

    #[tokio::test]
    async fn remote_embed_splits_batches() {
        let server = MockServer::start().await;
        // Each request must carry at most 2 inputs.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value = req.body_json().unwrap();
                let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                assert!(count <= 2, "batch larger than configured size");
                ResponseTemplate::new(200).set_body_json(embedding_body(4, count))
            })
            .expect(3)
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "custom-model".to_string(),
            "sk-test",
            Some(server.uri()),
            2,
        )
        .unwrap();

        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let out = provider.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn remote_embed_auth_failure_is_typed_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "custom-model".to_string(),
            "sk-bad",
            Some(server.uri()),
            64,
        )
        .unwrap();

        let err = provider.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Request { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn remote_embed_count_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(4, 1)))
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "custom-model".to_string(),
            "sk-test",
            Some(server.uri()),
            64,
        )
        .unwrap();

        let err = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::Malformed(_)));
    }

    #[tokio::test]
    async fn remote_embed_sends_model_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(
                serde_json::json!({"model": "text-embedding-3-small"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(4, 1)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "text-embedding-3-small".to_string(),
            "sk-test",
            Some(server.uri()),
            64,
        )
        .unwrap();

        provider.embed(&["hello".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn custom_embed_updates_dimension_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(7, 1)))
            .mount(&server)
            .await;

        let provider = CustomEmbedding::new(server.uri(), "default".to_string(), None, 1024, 64)
            .unwrap();
        assert_eq!(provider.dimension(), 1024);

        provider.embed(&["x".to_string()]).await.unwrap();
        assert_eq!(provider.dimension(), 7);
    }

    #[tokio::test]
    async fn responses_are_reordered_by_index() {
        let server = MockServer::start().await;
        // Deliberately shuffled indexes with distinguishable vectors.
        let body = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [1.0, 1.0] },
                { "index": 0, "embedding": [0.0, 0.0] },
            ]
        });
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = RemoteEmbedding::new(
            "custom-model".to_string(),
            "sk-test",
            Some(server.uri()),
            64,
        )
        .unwrap();

        let out = provider
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0], vec![0.0, 0.0]);
        assert_eq!(out[1], vec![1.0, 1.0]);
    }
}
