// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hybrid memory search engine: chunk, embed, store on write;
//! vector + keyword fan-out and weighted score fusion on read.
//!
//! The engine owns the degrade policy: runtime embedding failures fall back
//! to keyword-only search for the failing call, and three consecutive
//! failures flip the engine into keyword-only mode for the rest of its
//! lifetime. The transition is one-way; mode and failure counter are
//! exposed through [`MemorySearchEngine::get_stats`] so operators can see
//! the degrade instead of guessing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::counter;
use tracing::{debug, info, warn};

use engram_config::EngramConfig;
use engram_core::{EmbedError, EmbeddingProvider, EngramError};

use crate::chunker::MarkdownChunker;
use crate::embedder::ModelRegistry;
use crate::model_manager::ModelManager;
use crate::provider::{build_provider, ProviderSpec};
use crate::store::VectorStore;
use crate::types::{
    Chunk, EngineStats, MemorySearchResult, Metadata, ReindexStats, SearchHit, SourceInfo,
};

/// Consecutive embedding failures before the engine flips to keyword-only.
const EMBED_FAIL_THRESHOLD: u32 = 3;

/// Fan-out multiplier for hybrid search, capped at this many hits per side.
const FAN_OUT_CAP: usize = 50;

/// Backfill batch size during reindex.
const BACKFILL_BATCH: usize = 100;

/// Search mode of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector and keyword search fused by weight.
    Hybrid,
    /// Lexical search only; the embedding path is never invoked.
    KeywordOnly,
}

/// Tracks embedding health and owns the one-way Hybrid -> KeywordOnly
/// transition.
#[derive(Debug)]
pub struct DegradeSupervisor {
    mode: SearchMode,
    consecutive_failures: u32,
}

impl DegradeSupervisor {
    fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            consecutive_failures: 0,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// A successful embed call resets the failure streak. It never re-enables
    /// hybrid mode: the degrade is irreversible for the engine's lifetime.
    fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed embed call; at the threshold, flip to keyword-only.
    fn record_failure(&mut self) -> SearchMode {
        self.consecutive_failures += 1;
        if self.mode == SearchMode::Hybrid && self.consecutive_failures >= EMBED_FAIL_THRESHOLD {
            self.mode = SearchMode::KeywordOnly;
            warn!(
                failures = self.consecutive_failures,
                "embedding failed repeatedly, degrading to keyword-only mode for this engine's lifetime"
            );
        }
        self.mode
    }
}

/// Hybrid memory search engine over a single workspace.
///
/// Persists one SQLite database under `workspace/memory/` and indexes the
/// markdown files in that directory (plus whatever callers feed to
/// [`index_text`](Self::index_text)).
pub struct MemorySearchEngine {
    workspace: PathBuf,
    memory_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: MarkdownChunker,
    store: VectorStore,
    vector_weight: f64,
    keyword_weight: f64,
    default_top_k: usize,
    default_min_score: f64,
    supervisor: Mutex<DegradeSupervisor>,
}

impl MemorySearchEngine {
    /// Builds an engine from configuration, resolving the embedding provider
    /// once (see [`ProviderSpec::resolve`]).
    ///
    /// The shared `registry` lets multiple engines in one process reuse a
    /// loaded local model. When the local provider was selected, the model
    /// is obtained up front; an explicitly requested but unobtainable local
    /// model is the one fatal construction error.
    pub async fn new(
        workspace: impl Into<PathBuf>,
        config: EngramConfig,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self, EngramError> {
        let workspace = workspace.into();
        let memory_dir = workspace.join("memory");
        std::fs::create_dir_all(&memory_dir).map_err(|e| EngramError::Storage {
            source: Box::new(e),
        })?;

        let models = Arc::new(ModelManager::new(memory_dir.clone()));
        let spec = ProviderSpec::resolve(&config.embedding, &models);

        if let ProviderSpec::Local { model, .. } = &spec {
            models.ensure_model(model).await?;
        }

        let embedder = build_provider(&spec, registry, models);
        Self::build(workspace, memory_dir, config, embedder, spec.is_noop()).await
    }

    /// Builds an engine around a caller-supplied embedding provider.
    ///
    /// The engine starts in keyword-only mode when the provider is the
    /// no-op variant.
    pub async fn with_provider(
        workspace: impl Into<PathBuf>,
        config: EngramConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, EngramError> {
        let workspace = workspace.into();
        let memory_dir = workspace.join("memory");
        std::fs::create_dir_all(&memory_dir).map_err(|e| EngramError::Storage {
            source: Box::new(e),
        })?;

        let keyword_only = embedder.name() == "noop";
        Self::build(workspace, memory_dir, config, embedder, keyword_only).await
    }

    async fn build(
        workspace: PathBuf,
        memory_dir: PathBuf,
        config: EngramConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        keyword_only: bool,
    ) -> Result<Self, EngramError> {
        let store = VectorStore::open(memory_dir.join(&config.storage.db_name)).await?;
        let chunker = MarkdownChunker::new(&config.chunker);

        let mode = if keyword_only {
            SearchMode::KeywordOnly
        } else {
            SearchMode::Hybrid
        };

        info!(
            embedder = embedder.name(),
            keyword_only,
            vector_weight = config.search.vector_weight,
            keyword_weight = config.search.keyword_weight,
            db = %store.db_path().display(),
            "memory search engine initialized"
        );

        Ok(Self {
            workspace,
            memory_dir,
            embedder,
            chunker,
            store,
            vector_weight: config.search.vector_weight,
            keyword_weight: config.search.keyword_weight,
            default_top_k: config.search.top_k,
            default_min_score: config.search.min_score,
            supervisor: Mutex::new(DegradeSupervisor::new(mode)),
        })
    }

    fn current_mode(&self) -> SearchMode {
        // A poisoned lock degrades to the safe mode rather than panicking.
        self.supervisor
            .lock()
            .map(|s| s.mode())
            .unwrap_or(SearchMode::KeywordOnly)
    }

    fn record_embed_success(&self) {
        if let Ok(mut supervisor) = self.supervisor.lock() {
            supervisor.record_success();
        }
    }

    fn record_embed_failure(&self) {
        counter!("engram_embed_failures_total").increment(1);
        if let Ok(mut supervisor) = self.supervisor.lock() {
            supervisor.record_failure();
        }
    }

    // --- Indexing ---

    /// Index a piece of text under `source`.
    ///
    /// Chunk, look up the embedding cache by content hash, embed only the
    /// misses in one batch, then upsert. Returns the number of chunk rows
    /// written or updated.
    pub async fn index_text(
        &self,
        text: &str,
        source: &str,
        metadata: Option<Metadata>,
    ) -> Result<usize, EngramError> {
        if text.trim().is_empty() {
            return Ok(0);
        }

        let t0 = Instant::now();

        let chunks = self.chunker.chunk(text, source, metadata);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embed_chunks_cached(&chunks).await?;
        let written = self
            .store
            .upsert_chunks(&chunks, embeddings.as_deref())
            .await?;

        counter!("engram_chunks_indexed_total").increment(written as u64);
        debug!(
            source,
            chunks = chunks.len(),
            written,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "indexed text"
        );
        Ok(written)
    }

    /// Index a file, using its workspace-relative path as the source id.
    ///
    /// Missing files index zero chunks rather than failing; content is
    /// decoded as UTF-8 with lossy replacement for stray bytes.
    pub async fn index_file(
        &self,
        file_path: &Path,
        metadata: Option<Metadata>,
    ) -> Result<usize, EngramError> {
        let Ok(raw) = tokio::fs::read(file_path).await else {
            warn!(path = %file_path.display(), "file not found or unreadable");
            return Ok(0);
        };
        let text = String::from_utf8_lossy(&raw);
        if text.trim().is_empty() {
            return Ok(0);
        }

        let source = self.source_for_path(file_path);

        let mut file_meta = metadata.unwrap_or_default();
        file_meta.insert(
            "file_path".to_string(),
            serde_json::json!(file_path.display().to_string()),
        );
        file_meta.insert("file_size".to_string(), serde_json::json!(raw.len()));

        self.index_text(&text, &source, Some(file_meta)).await
    }

    /// Index every markdown file under `workspace/memory/`.
    ///
    /// Returns written-chunk counts per source, in stable name order.
    pub async fn index_memory_dir(&self) -> Result<BTreeMap<String, usize>, EngramError> {
        let mut results = BTreeMap::new();

        let files = self.memory_dir_files().await?;
        for file in &files {
            let written = self.index_file(file, None).await?;
            results.insert(self.source_for_path(file), written);
        }

        let total: usize = results.values().sum();
        if files.is_empty() {
            warn!(dir = %self.memory_dir.display(), "no markdown files found in memory directory");
        } else {
            info!(files = files.len(), chunks = total, "indexed memory directory");
        }
        Ok(results)
    }

    /// Full reindex: re-scan the memory directory, drop sources whose file
    /// no longer exists, backfill missing embeddings, rebuild the FTS mirror.
    pub async fn reindex_all(&self) -> Result<ReindexStats, EngramError> {
        let t0 = Instant::now();

        let index_results = self.index_memory_dir().await?;

        let existing: std::collections::HashSet<String> = self
            .memory_dir_files()
            .await?
            .iter()
            .map(|f| self.source_for_path(f))
            .collect();

        let mut cleaned = 0usize;
        for info in self.store.get_all_sources().await? {
            if !existing.contains(&info.source) {
                self.store.delete_source(&info.source).await?;
                cleaned += 1;
            }
        }

        let backfilled = self.backfill_embeddings(BACKFILL_BATCH).await?;

        self.store.rebuild_fts().await?;

        let store_stats = self.store.get_stats().await?;
        let stats = ReindexStats {
            files_indexed: index_results.len(),
            chunks_written: index_results.values().sum(),
            sources_cleaned: cleaned,
            embeddings_backfilled: backfilled,
            elapsed_ms: t0.elapsed().as_millis() as u64,
            store: store_stats,
        };

        info!(
            files = stats.files_indexed,
            chunks = stats.chunks_written,
            cleaned = stats.sources_cleaned,
            backfilled = stats.embeddings_backfilled,
            "reindex completed"
        );
        Ok(stats)
    }

    // --- Search ---

    /// Hybrid search with explicit parameters.
    ///
    /// In keyword-only mode the embedding path is never invoked. In hybrid
    /// mode the query is embedded; on failure this call falls back to
    /// keyword-only and the failure counts toward the degrade threshold.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&str>,
        min_score: f64,
    ) -> Result<Vec<MemorySearchResult>, EngramError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        counter!("engram_searches_total").increment(1);
        let t0 = Instant::now();

        let mut results = match self.current_mode() {
            SearchMode::KeywordOnly => {
                self.search_keyword_only(query, top_k, source_filter).await?
            }
            SearchMode::Hybrid => self.search_hybrid(query, top_k, source_filter).await?,
        };

        results.retain(|r| r.score >= min_score);

        if let Some(top) = results.first() {
            let preview: String = query.chars().take(30).collect();
            debug!(
                query = %preview,
                results = results.len(),
                top_score = top.score,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "search completed"
            );
        }
        Ok(results)
    }

    /// [`search`](Self::search) with the configured `top_k` and `min_score`.
    pub async fn search_default(
        &self,
        query: &str,
    ) -> Result<Vec<MemorySearchResult>, EngramError> {
        self.search(query, self.default_top_k, None, self.default_min_score)
            .await
    }

    async fn search_hybrid(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<MemorySearchResult>, EngramError> {
        let query_embedding = match self.embed_single(query).await {
            Ok(embedding) => {
                self.record_embed_success();
                embedding
            }
            Err(e) => {
                warn!(error = %e, "query embedding failed, falling back to keyword search");
                self.record_embed_failure();
                return self.search_keyword_only(query, top_k, source_filter).await;
            }
        };

        let fan_out = (top_k * 3).min(FAN_OUT_CAP);
        let vector_hits = self
            .store
            .search_vector(&query_embedding, fan_out, source_filter)
            .await?;
        let keyword_hits = self
            .store
            .search_keyword(query, fan_out, source_filter)
            .await?;

        Ok(fuse_results(
            vector_hits,
            keyword_hits,
            self.vector_weight,
            self.keyword_weight,
            top_k,
        ))
    }

    async fn search_keyword_only(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<MemorySearchResult>, EngramError> {
        let hits = self.store.search_keyword(query, top_k, source_filter).await?;

        Ok(hits
            .into_iter()
            .map(|hit| MemorySearchResult {
                content: hit.content,
                heading_context: hit.heading_context,
                source: hit.source,
                score: hit.keyword_score,
                vector_score: 0.0,
                keyword_score: hit.keyword_score,
                chunk_id: hit.chunk_id,
                metadata: hit.metadata,
            })
            .collect())
    }

    // --- Embedding helpers ---

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embedder.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Malformed("embedding returned no vectors".to_string()))
    }

    /// Embed chunks with the content-hash cache in front of the provider.
    ///
    /// Returns `None` in keyword-only mode or when the embed call fails --
    /// chunks are then stored without embeddings and picked up by a later
    /// backfill.
    async fn embed_chunks_cached(
        &self,
        chunks: &[Chunk],
    ) -> Result<Option<Vec<Vec<f32>>>, EngramError> {
        if self.current_mode() == SearchMode::KeywordOnly {
            return Ok(None);
        }

        let hashes: Vec<String> = chunks.iter().map(|c| c.content_hash()).collect();
        let cached = self.store.get_cached_embeddings(&hashes).await?;

        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; chunks.len()];
        let mut miss_indices: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            if let Some(embedding) = cached.get(&hashes[i]) {
                embeddings[i] = Some(embedding.clone());
            } else {
                miss_indices.push(i);
                miss_texts.push(chunk.search_text());
            }
        }

        let cache_hits = chunks.len() - miss_indices.len();
        if cache_hits > 0 {
            debug!(hits = cache_hits, total = chunks.len(), "embedding cache hits");
        }

        if !miss_texts.is_empty() {
            let new_embeddings = match self.embedder.embed(&miss_texts).await {
                Ok(vectors) if vectors.len() == miss_texts.len() => {
                    self.record_embed_success();
                    vectors
                }
                Ok(vectors) => {
                    warn!(
                        expected = miss_texts.len(),
                        got = vectors.len(),
                        "embedding batch came back misaligned, storing chunks without embeddings"
                    );
                    self.record_embed_failure();
                    return Ok(None);
                }
                Err(e) => {
                    warn!(error = %e, "embedding failed, storing chunks without embeddings");
                    self.record_embed_failure();
                    return Ok(None);
                }
            };

            let mut cache_items: Vec<(String, Vec<f32>)> = Vec::new();
            for (idx, embedding) in miss_indices.iter().zip(new_embeddings) {
                cache_items.push((hashes[*idx].clone(), embedding.clone()));
                embeddings[*idx] = Some(embedding);
            }
            self.store.cache_embeddings(&cache_items).await?;
        }

        let complete: Option<Vec<Vec<f32>>> = embeddings.into_iter().collect();
        complete
            .map(Some)
            .ok_or_else(|| EngramError::Internal("embedding batch left gaps".to_string()))
    }

    /// Embed chunks persisted without a vector, in bounded batches, reusing
    /// the cache before calling the provider.
    async fn backfill_embeddings(&self, batch_size: usize) -> Result<usize, EngramError> {
        if self.current_mode() == SearchMode::KeywordOnly {
            return Ok(0);
        }

        let mut total_backfilled = 0usize;

        loop {
            let missing = self.store.get_chunks_missing_embedding(batch_size).await?;
            if missing.is_empty() {
                break;
            }

            let hashes: Vec<String> = missing.iter().map(|m| m.content_hash.clone()).collect();
            let cached = self.store.get_cached_embeddings(&hashes).await?;

            let mut updates: Vec<(i64, Vec<f32>)> = Vec::new();
            let mut miss_rows: Vec<&crate::types::PendingChunk> = Vec::new();
            let mut miss_texts: Vec<String> = Vec::new();

            for pending in &missing {
                if let Some(embedding) = cached.get(&pending.content_hash) {
                    updates.push((pending.chunk_id, embedding.clone()));
                } else {
                    miss_rows.push(pending);
                    miss_texts.push(pending.content.clone());
                }
            }

            if !miss_texts.is_empty() {
                let new_embeddings = match self.embedder.embed(&miss_texts).await {
                    Ok(vectors) if vectors.len() == miss_texts.len() => vectors,
                    Ok(_) | Err(_) => {
                        warn!("backfill embedding failed, leaving remaining chunks for later");
                        break;
                    }
                };

                let mut cache_items: Vec<(String, Vec<f32>)> = Vec::new();
                for (pending, embedding) in miss_rows.iter().zip(new_embeddings) {
                    cache_items.push((pending.content_hash.clone(), embedding.clone()));
                    updates.push((pending.chunk_id, embedding));
                }
                self.store.cache_embeddings(&cache_items).await?;
            }

            if !updates.is_empty() {
                total_backfilled += self.store.update_chunk_embeddings(&updates).await?;
            }

            if missing.len() < batch_size {
                break;
            }
        }

        if total_backfilled > 0 {
            info!(chunks = total_backfilled, "backfilled embeddings");
        }
        Ok(total_backfilled)
    }

    // --- Administration ---

    /// Engine statistics: store stats plus search-mode observability.
    pub async fn get_stats(&self) -> Result<EngineStats, EngramError> {
        let store = self.store.get_stats().await?;
        let (keyword_only, failures) = self
            .supervisor
            .lock()
            .map(|s| (s.mode() == SearchMode::KeywordOnly, s.consecutive_failures()))
            .unwrap_or((true, 0));

        Ok(EngineStats {
            store,
            embedder: self.embedder.name().to_string(),
            keyword_only,
            consecutive_embed_failures: failures,
            vector_weight: self.vector_weight,
            keyword_weight: self.keyword_weight,
        })
    }

    /// All indexed sources.
    pub async fn get_sources(&self) -> Result<Vec<SourceInfo>, EngramError> {
        self.store.get_all_sources().await
    }

    /// Remove every indexed chunk. Returns the number of rows removed.
    pub async fn clear(&self) -> Result<usize, EngramError> {
        self.store.delete_all().await
    }

    /// The workspace this engine serves.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    // --- Helpers ---

    fn source_for_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    async fn memory_dir_files(&self) -> Result<Vec<PathBuf>, EngramError> {
        let mut files = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.memory_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(files),
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Weighted fusion of vector and keyword hit sets.
///
/// Hits are merged by chunk id (not content); for a chunk found by both
/// paths the per-side maxima are kept, and the fused score is
/// `vector_weight * vector_score + keyword_weight * keyword_score` with a
/// missing side contributing 0.
pub fn fuse_results(
    vector_hits: Vec<SearchHit>,
    keyword_hits: Vec<SearchHit>,
    vector_weight: f64,
    keyword_weight: f64,
    top_k: usize,
) -> Vec<MemorySearchResult> {
    let mut merged: HashMap<i64, MemorySearchResult> = HashMap::new();

    for hit in vector_hits {
        let score = hit.vector_score;
        merged
            .entry(hit.chunk_id)
            .and_modify(|r| r.vector_score = r.vector_score.max(score))
            .or_insert_with(|| MemorySearchResult {
                content: hit.content,
                heading_context: hit.heading_context,
                source: hit.source,
                score: 0.0,
                vector_score: score,
                keyword_score: 0.0,
                chunk_id: hit.chunk_id,
                metadata: hit.metadata,
            });
    }

    for hit in keyword_hits {
        let score = hit.keyword_score;
        merged
            .entry(hit.chunk_id)
            .and_modify(|r| r.keyword_score = r.keyword_score.max(score))
            .or_insert_with(|| MemorySearchResult {
                content: hit.content,
                heading_context: hit.heading_context,
                source: hit.source,
                score: 0.0,
                vector_score: 0.0,
                keyword_score: score,
                chunk_id: hit.chunk_id,
                metadata: hit.metadata,
            });
    }

    let mut results: Vec<MemorySearchResult> = merged.into_values().collect();
    for result in &mut results {
        result.score =
            vector_weight * result.vector_score + keyword_weight * result.keyword_score;
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);
    results
}
