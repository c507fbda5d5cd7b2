// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed hybrid store: vector BLOBs, an FTS5 mirror for BM25
//! keyword search, and a content-hash embedding cache in one file.
//!
//! All access runs on tokio-rusqlite's single background connection thread,
//! which serves as the process-wide exclusive lock: reads and writes alike
//! are serialized for their full duration. A batch upsert commits each row
//! independently inside one lock hold; a crash mid-batch can leave a
//! partially updated source.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use engram_core::EngramError;

use crate::migrations;
use crate::types::{
    blob_to_vec, cosine_similarity, vec_to_blob, Chunk, Metadata, PendingChunk, SearchHit,
    SourceInfo, StoreStats,
};

/// SQLite's default parameter limit is 999; stay under it when batching.
const SQL_PARAM_BATCH: usize = 900;

/// CJK ideograph ranges, matched one character at a time.
static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "([\\u{4e00}-\\u{9fff}\\u{3400}-\\u{4dbf}\\u{f900}-\\u{faff}",
        "\\u{20000}-\\u{2a6df}\\u{2a700}-\\u{2b73f}",
        "\\u{2b740}-\\u{2b81f}\\u{2b820}-\\u{2ceaf}",
        "\\u{2ceb0}-\\u{2ebef}\\u{30000}-\\u{3134f}])"
    ))
    .expect("valid CJK regex")
});

/// Everything that is not a word character, whitespace, or a common CJK
/// ideograph; stripped from keyword queries.
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\u{4e00}-\u{9fff}]").expect("valid punctuation regex"));

/// Helper to convert tokio_rusqlite errors into EngramError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> EngramError {
    EngramError::Storage {
        source: Box::new(e),
    }
}

/// Surround each CJK character with spaces so the unicode61 tokenizer
/// splits runs of ideographs into per-character tokens.
///
/// Applied identically to indexed `search_text` and to incoming queries, so
/// sub-word matching works for CJK scripts.
pub(crate) fn cjk_segment(text: &str) -> String {
    CJK_RE.replace_all(text, " $1 ").into_owned()
}

/// Convert a natural-language query into an FTS5 MATCH expression.
///
/// CJK-segments the query the same way `search_text` was indexed, strips
/// punctuation, drops single-ASCII-letter tokens, quotes each survivor, and
/// joins with OR for broad recall. Returns an empty string when nothing
/// usable remains.
fn build_fts_query(query: &str) -> String {
    let segmented = cjk_segment(query);
    let cleaned = NON_WORD_RE.replace_all(&segmented, " ");

    let mut valid_tokens: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            // Single CJK characters still carry meaning; only lone ASCII
            // letters are noise.
            if c.is_ascii_alphabetic() {
                continue;
            }
        }
        valid_tokens.push(format!("\"{token}\""));
    }

    valid_tokens.join(" OR ")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

fn metadata_json(metadata: &Metadata) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// Precomputed row data moved into the upsert closure.
struct UpsertRow {
    source: String,
    chunk_index: i64,
    content: String,
    heading_context: String,
    search_text: String,
    content_hash: String,
    metadata_json: String,
    embedding: Option<Vec<u8>>,
    dimension: Option<i64>,
}

/// Hybrid vector + FTS5 store over a single SQLite file.
///
/// Schema is installed by embedded refinery migrations on open, so the
/// store is safe to reopen against a database created by a previous run.
pub struct VectorStore {
    conn: Connection,
    db_path: PathBuf,
}

impl VectorStore {
    /// Opens (or creates) the store at `db_path`, creating parent
    /// directories and applying pending migrations.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, EngramError> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngramError::Storage {
                source: Box::new(e),
            })?;
        }

        // Apply PRAGMAs and migrations on a short-lived blocking connection
        // before handing the file to the async wrapper.
        let migrate_path = db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), EngramError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(|e| EngramError::Storage {
                    source: Box::new(e),
                })?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| EngramError::Storage {
                source: Box::new(e),
            })?;
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| EngramError::Internal(format!("migration task panicked: {e}")))??;

        let conn = Connection::open(&db_path).await.map_err(storage_err)?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA busy_timeout=5000;")?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;

        debug!(path = %db_path.display(), "vector store opened");
        Ok(Self { conn, db_path })
    }

    /// Path of the underlying database file.
    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    // --- Write operations ---

    /// Batch upsert of chunks, keyed on `(source, chunk_index)`.
    ///
    /// Rows whose content hash is unchanged are skipped entirely when an
    /// embedding is already present or none was supplied; when the content
    /// is unchanged but an embedding is newly available, only the embedding
    /// column is patched. Every embedding written here also lands in the
    /// embedding cache keyed by content hash.
    ///
    /// Returns the number of rows written or fully updated (embedding-only
    /// patches are not counted).
    pub async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: Option<&[Vec<f32>]>,
    ) -> Result<usize, EngramError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        if let Some(embeds) = embeddings {
            if embeds.len() != chunks.len() {
                return Err(EngramError::Internal(format!(
                    "embeddings length ({}) != chunks length ({})",
                    embeds.len(),
                    chunks.len()
                )));
            }
        }

        let rows: Vec<UpsertRow> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let embedding = embeddings.map(|e| vec_to_blob(&e[i]));
                let dimension = embeddings.map(|e| e[i].len() as i64);
                UpsertRow {
                    source: chunk.source.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    heading_context: chunk.heading_context.clone(),
                    search_text: cjk_segment(&format!(
                        "{} {}",
                        chunk.heading_context, chunk.content
                    )),
                    content_hash: chunk.content_hash(),
                    metadata_json: metadata_json(&chunk.metadata),
                    embedding,
                    dimension,
                }
            })
            .collect();

        let written = self
            .conn
            .call(move |conn| {
                let now = now_rfc3339();
                let mut written = 0usize;

                for row in &rows {
                    let existing: Option<(i64, String)> = conn
                        .query_row(
                            "SELECT id, content_hash FROM memory_chunks WHERE source = ?1 AND chunk_index = ?2",
                            rusqlite::params![row.source, row.chunk_index],
                            |r| Ok((r.get(0)?, r.get(1)?)),
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(other),
                        })?;

                    if let Some((id, ref hash)) = existing {
                        if *hash == row.content_hash {
                            // Content unchanged: at most patch a missing embedding.
                            if let Some(ref blob) = row.embedding {
                                conn.execute(
                                    "UPDATE memory_chunks SET embedding = ?1, updated_at = ?2 WHERE id = ?3 AND embedding IS NULL",
                                    rusqlite::params![blob, now, id],
                                )?;
                                conn.execute(
                                    "INSERT OR REPLACE INTO memory_embed_cache(content_hash, embedding, dimension, created_at) VALUES (?1, ?2, ?3, ?4)",
                                    rusqlite::params![row.content_hash, blob, row.dimension, now],
                                )?;
                            }
                            continue;
                        }
                    }

                    conn.execute(
                        "INSERT INTO memory_chunks(
                            source, chunk_index, content, heading_context,
                            search_text, embedding, content_hash, metadata_json,
                            created_at, updated_at
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                        ON CONFLICT(source, chunk_index) DO UPDATE SET
                            content = excluded.content,
                            heading_context = excluded.heading_context,
                            search_text = excluded.search_text,
                            embedding = excluded.embedding,
                            content_hash = excluded.content_hash,
                            metadata_json = excluded.metadata_json,
                            updated_at = excluded.updated_at",
                        rusqlite::params![
                            row.source,
                            row.chunk_index,
                            row.content,
                            row.heading_context,
                            row.search_text,
                            row.embedding,
                            row.content_hash,
                            row.metadata_json,
                            now,
                            now
                        ],
                    )?;
                    written += 1;

                    if let Some(ref blob) = row.embedding {
                        conn.execute(
                            "INSERT OR REPLACE INTO memory_embed_cache(content_hash, embedding, dimension, created_at) VALUES (?1, ?2, ?3, ?4)",
                            rusqlite::params![row.content_hash, blob, row.dimension, now],
                        )?;
                    }
                }

                Ok(written)
            })
            .await
            .map_err(storage_err)?;

        if written > 0 {
            debug!(written, "upserted chunks");
        }
        Ok(written)
    }

    /// Delete all chunks belonging to `source`. Returns the rows removed.
    pub async fn delete_source(&self, source: &str) -> Result<usize, EngramError> {
        let source = source.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM memory_chunks WHERE source = ?1", [&source])?;
                Ok(deleted)
            })
            .await
            .map_err(storage_err)?;

        if deleted > 0 {
            debug!(deleted, "deleted chunks for source");
        }
        Ok(deleted)
    }

    /// Delete every chunk and the embedding cache, keeping the schema.
    pub async fn delete_all(&self) -> Result<usize, EngramError> {
        let deleted = self
            .conn
            .call(|conn| {
                let deleted = conn.execute("DELETE FROM memory_chunks", [])?;
                conn.execute("DELETE FROM memory_embed_cache", [])?;
                Ok(deleted)
            })
            .await
            .map_err(storage_err)?;

        info!(deleted, "cleared all chunks");
        Ok(deleted)
    }

    // --- Vector search ---

    /// Cosine-similarity search over rows that have an embedding.
    ///
    /// Full scan with in-memory ranking, suitable for the intended corpus
    /// scale (well under 100k chunks). An all-zero query vector (the no-op
    /// provider) short-circuits to an empty result; only strictly positive
    /// similarities are returned.
    pub async fn search_vector(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, EngramError> {
        if query_embedding.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        let query = query_embedding.to_vec();
        let filter = source_filter.map(str::to_string);

        self.conn
            .call(move |conn| {
                let sql_base = "SELECT id, source, chunk_index, content, heading_context, \
                                embedding, metadata_json, created_at \
                                FROM memory_chunks WHERE embedding IS NOT NULL";

                let mut scored: Vec<(f64, SearchHit)> = Vec::new();
                let mut collect = |row: &rusqlite::Row| -> Result<(), rusqlite::Error> {
                    let blob: Vec<u8> = row.get(5)?;
                    let similarity = cosine_similarity(&query, &blob_to_vec(&blob));
                    if similarity > 0.0 {
                        let metadata_raw: String = row.get(6)?;
                        scored.push((
                            similarity,
                            SearchHit {
                                chunk_id: row.get(0)?,
                                source: row.get(1)?,
                                chunk_index: row.get(2)?,
                                content: row.get(3)?,
                                heading_context: row.get(4)?,
                                metadata: parse_metadata(&metadata_raw),
                                vector_score: similarity,
                                keyword_score: 0.0,
                                created_at: row.get(7)?,
                            },
                        ));
                    }
                    Ok(())
                };

                if let Some(ref source) = filter {
                    let mut stmt = conn.prepare(&format!("{sql_base} AND source = ?1"))?;
                    let mut rows = stmt.query([source])?;
                    while let Some(row) = rows.next()? {
                        collect(row)?;
                    }
                } else {
                    let mut stmt = conn.prepare(sql_base)?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        collect(row)?;
                    }
                }

                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(top_k);

                Ok(scored.into_iter().map(|(_, hit)| hit).collect::<Vec<_>>())
            })
            .await
            .map_err(storage_err)
    }

    // --- Keyword search (FTS5) ---

    /// BM25 keyword search via the FTS5 mirror.
    ///
    /// Scores are sign-normalized and divided by the batch maximum, so the
    /// best hit in a batch scores 1.0. A query that normalizes to nothing
    /// returns empty without touching the index; FTS engine errors are
    /// swallowed into an empty result rather than propagated.
    pub async fn search_keyword(
        &self,
        query: &str,
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, EngramError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fts_query = build_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let filter = source_filter.map(str::to_string);

        self.conn
            .call(move |conn| {
                let fetched = fetch_keyword_rows(conn, &fts_query, filter.as_deref(), top_k);
                let raw = match fetched {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, query = %fts_query, "FTS5 search failed");
                        return Ok(Vec::new());
                    }
                };

                if raw.is_empty() {
                    return Ok(Vec::new());
                }

                // BM25 ranks are negative (more negative = more relevant);
                // normalize so the top hit in this batch scores 1.0.
                let max_score = raw
                    .iter()
                    .map(|(score, _)| score.abs())
                    .fold(0.0_f64, f64::max)
                    .max(f64::MIN_POSITIVE);

                Ok(raw
                    .into_iter()
                    .map(|(score, mut hit)| {
                        hit.keyword_score = score.abs() / max_score;
                        hit
                    })
                    .collect::<Vec<_>>())
            })
            .await
            .map_err(storage_err)
    }

    /// Fetch a single chunk row by id.
    pub async fn get_chunk_by_id(&self, chunk_id: i64) -> Result<Option<SearchHit>, EngramError> {
        self.conn
            .call(move |conn| {
                let hit = conn
                    .query_row(
                        "SELECT id, source, chunk_index, content, heading_context, metadata_json, created_at \
                         FROM memory_chunks WHERE id = ?1",
                        [chunk_id],
                        |row| {
                            let metadata_raw: String = row.get(5)?;
                            Ok(SearchHit {
                                chunk_id: row.get(0)?,
                                source: row.get(1)?,
                                chunk_index: row.get(2)?,
                                content: row.get(3)?,
                                heading_context: row.get(4)?,
                                metadata: parse_metadata(&metadata_raw),
                                vector_score: 0.0,
                                keyword_score: 0.0,
                                created_at: row.get(6)?,
                            })
                        },
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(hit)
            })
            .await
            .map_err(storage_err)
    }

    // --- Introspection ---

    /// All indexed sources with chunk accounting, most recently updated first.
    pub async fn get_all_sources(&self) -> Result<Vec<SourceInfo>, EngramError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT source,
                            COUNT(*) AS chunk_count,
                            SUM(CASE WHEN embedding IS NOT NULL THEN 1 ELSE 0 END) AS embedded_count,
                            MIN(created_at) AS first_indexed,
                            MAX(updated_at) AS last_updated
                     FROM memory_chunks
                     GROUP BY source
                     ORDER BY last_updated DESC",
                )?;
                let sources = stmt
                    .query_map([], |row| {
                        Ok(SourceInfo {
                            source: row.get(0)?,
                            chunk_count: row.get::<_, i64>(1)? as usize,
                            embedded_count: row.get::<_, i64>(2)? as usize,
                            first_indexed: row.get(3)?,
                            last_updated: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await
            .map_err(storage_err)
    }

    /// Total chunk count, optionally restricted to embedded rows.
    pub async fn count_chunks(&self, embedded_only: bool) -> Result<usize, EngramError> {
        self.conn
            .call(move |conn| {
                let sql = if embedded_only {
                    "SELECT COUNT(*) FROM memory_chunks WHERE embedding IS NOT NULL"
                } else {
                    "SELECT COUNT(*) FROM memory_chunks"
                };
                let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }

    /// Chunks persisted without an embedding, oldest first (for backfill).
    pub async fn get_chunks_missing_embedding(
        &self,
        limit: usize,
    ) -> Result<Vec<PendingChunk>, EngramError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source, chunk_index, content, heading_context, content_hash, metadata_json \
                     FROM memory_chunks WHERE embedding IS NULL \
                     ORDER BY created_at ASC LIMIT ?1",
                )?;
                let pending = stmt
                    .query_map([limit as i64], |row| {
                        let metadata_raw: String = row.get(6)?;
                        Ok(PendingChunk {
                            chunk_id: row.get(0)?,
                            source: row.get(1)?,
                            chunk_index: row.get(2)?,
                            content: row.get(3)?,
                            heading_context: row.get(4)?,
                            content_hash: row.get(5)?,
                            metadata: parse_metadata(&metadata_raw),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(pending)
            })
            .await
            .map_err(storage_err)
    }

    // --- Embedding cache ---

    /// Look up cached embeddings for `content_hashes`.
    ///
    /// Returns a partial map containing only the hashes that hit.
    pub async fn get_cached_embeddings(
        &self,
        content_hashes: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, EngramError> {
        if content_hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let hashes = content_hashes.to_vec();
        self.conn
            .call(move |conn| {
                let mut result = HashMap::new();

                for batch in hashes.chunks(SQL_PARAM_BATCH) {
                    let placeholders: Vec<String> =
                        (1..=batch.len()).map(|i| format!("?{i}")).collect();
                    let sql = format!(
                        "SELECT content_hash, embedding FROM memory_embed_cache WHERE content_hash IN ({})",
                        placeholders.join(", ")
                    );
                    let mut stmt = conn.prepare(&sql)?;

                    let params: Vec<&dyn rusqlite::types::ToSql> =
                        batch.iter().map(|h| h as &dyn rusqlite::types::ToSql).collect();
                    let mut rows = stmt.query(params.as_slice())?;
                    while let Some(row) = rows.next()? {
                        let hash: String = row.get(0)?;
                        let blob: Vec<u8> = row.get(1)?;
                        result.insert(hash, blob_to_vec(&blob));
                    }
                }

                Ok(result)
            })
            .await
            .map_err(storage_err)
    }

    /// Write `(content_hash, embedding)` pairs into the cache.
    pub async fn cache_embeddings(
        &self,
        items: &[(String, Vec<f32>)],
    ) -> Result<(), EngramError> {
        if items.is_empty() {
            return Ok(());
        }

        let rows: Vec<(String, Vec<u8>, i64)> = items
            .iter()
            .map(|(hash, emb)| (hash.clone(), vec_to_blob(emb), emb.len() as i64))
            .collect();

        self.conn
            .call(move |conn| {
                let now = now_rfc3339();
                for (hash, blob, dimension) in &rows {
                    conn.execute(
                        "INSERT OR REPLACE INTO memory_embed_cache(content_hash, embedding, dimension, created_at) VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![hash, blob, dimension, now],
                    )?;
                }
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Patch embeddings onto existing chunk rows (backfill path).
    ///
    /// Returns the number of rows actually updated.
    pub async fn update_chunk_embeddings(
        &self,
        updates: &[(i64, Vec<f32>)],
    ) -> Result<usize, EngramError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let rows: Vec<(i64, Vec<u8>)> = updates
            .iter()
            .map(|(id, emb)| (*id, vec_to_blob(emb)))
            .collect();

        let updated = self
            .conn
            .call(move |conn| {
                let now = now_rfc3339();
                let mut updated = 0usize;
                for (chunk_id, blob) in &rows {
                    updated += conn.execute(
                        "UPDATE memory_chunks SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![blob, now, chunk_id],
                    )?;
                }
                Ok(updated)
            })
            .await
            .map_err(storage_err)?;

        if updated > 0 {
            debug!(updated, "backfilled chunk embeddings");
        }
        Ok(updated)
    }

    // --- Maintenance ---

    /// Atomically regenerate the FTS5 mirror from current chunk rows.
    pub async fn rebuild_fts(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO memory_chunks_fts(memory_chunks_fts) VALUES('rebuild')",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        info!("FTS5 index rebuilt");
        Ok(())
    }

    /// Compact the database file.
    pub async fn vacuum(&self) -> Result<(), EngramError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("VACUUM")?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        info!("VACUUM completed");
        Ok(())
    }

    /// Storage statistics.
    pub async fn get_stats(&self) -> Result<StoreStats, EngramError> {
        let (total, embedded, sources, cache_entries) = self
            .conn
            .call(|conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memory_chunks", [], |r| r.get(0))?;
                let embedded: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memory_chunks WHERE embedding IS NOT NULL",
                    [],
                    |r| r.get(0),
                )?;
                let sources: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT source) FROM memory_chunks",
                    [],
                    |r| r.get(0),
                )?;
                let cache_entries: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memory_embed_cache", [], |r| r.get(0))?;
                Ok((total, embedded, sources, cache_entries))
            })
            .await
            .map_err(storage_err)?;

        let db_size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total_chunks: total as usize,
            embedded_chunks: embedded as usize,
            missing_embeddings: (total - embedded) as usize,
            unique_sources: sources as usize,
            cache_entries: cache_entries as usize,
            db_size_bytes,
            db_path: self.db_path.display().to_string(),
        })
    }
}

/// Run the FTS5 MATCH query, returning raw `(bm25_score, hit)` pairs.
///
/// Kept separate so the caller can swallow FTS engine errors into an empty
/// result without also masking genuine storage failures elsewhere.
fn fetch_keyword_rows(
    conn: &mut rusqlite::Connection,
    fts_query: &str,
    source_filter: Option<&str>,
    top_k: usize,
) -> Result<Vec<(f64, SearchHit)>, rusqlite::Error> {
    let sql_base = "SELECT mc.id, mc.source, mc.chunk_index, mc.content, mc.heading_context, \
                    mc.metadata_json, mc.created_at, bm25(memory_chunks_fts) AS score \
                    FROM memory_chunks_fts \
                    JOIN memory_chunks mc ON mc.id = memory_chunks_fts.rowid \
                    WHERE memory_chunks_fts MATCH ?1";

    let map_row = |row: &rusqlite::Row| -> Result<(f64, SearchHit), rusqlite::Error> {
        let metadata_raw: String = row.get(5)?;
        let score: f64 = row.get(7)?;
        Ok((
            score,
            SearchHit {
                chunk_id: row.get(0)?,
                source: row.get(1)?,
                chunk_index: row.get(2)?,
                content: row.get(3)?,
                heading_context: row.get(4)?,
                metadata: parse_metadata(&metadata_raw),
                vector_score: 0.0,
                keyword_score: 0.0,
                created_at: row.get(6)?,
            },
        ))
    };

    if let Some(source) = source_filter {
        let sql = format!(
            "{sql_base} AND mc.source = ?2 ORDER BY bm25(memory_chunks_fts) LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map(
            rusqlite::params![fts_query, source, top_k as i64],
            map_row,
        )?
        .collect()
    } else {
        let sql = format!("{sql_base} ORDER BY bm25(memory_chunks_fts) LIMIT ?2");
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map(rusqlite::params![fts_query, top_k as i64], map_row)?
            .collect()
    }
}
