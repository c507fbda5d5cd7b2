// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Markdown-aware chunker splitting documents along heading boundaries.
//!
//! Each chunk carries a breadcrumb of its enclosing section titles
//! (`"# Project > ## Architecture > ### Storage"`), built from a heading
//! stack scanned in document order. Code-fenced regions are never treated
//! as headings or split internally. Sections that exceed the size limit are
//! re-split at sentence boundaries with a small overlap window; plain text
//! without headings falls back to fixed sliding windows.

use std::sync::LazyLock;

use regex::Regex;

use engram_config::ChunkerConfig;

use crate::types::{Chunk, Metadata};

/// Heading lines, levels 1-4.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,4})\s+(.+)$").expect("valid heading regex"));

/// Markdown-aware chunker.
///
/// Deterministic for identical input; produces zero chunks for empty or
/// whitespace-only text. All size accounting is in characters, never bytes.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    max_chunk_size: usize,
    min_chunk_size: usize,
    overlap_chars: usize,
}

impl MarkdownChunker {
    /// Creates a chunker from configuration.
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            min_chunk_size: config.min_chunk_size,
            overlap_chars: config.overlap_chars,
        }
    }

    /// Splits `text` into an ordered sequence of chunks.
    ///
    /// Markdown documents (anything containing a heading line) are split by
    /// heading; everything else goes through the fixed-window fallback.
    pub fn chunk(&self, text: &str, source: &str, metadata: Option<Metadata>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let metadata = metadata.unwrap_or_default();

        if text.lines().any(|line| HEADING_RE.is_match(line)) {
            self.chunk_markdown(text, source, &metadata)
        } else {
            self.chunk_plain(text, source, &metadata)
        }
    }

    /// Split by heading hierarchy, then size-normalize each section.
    fn chunk_markdown(&self, text: &str, source: &str, metadata: &Metadata) -> Vec<Chunk> {
        let sections = split_by_headings(text);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut chunk_idx: i64 = 0;

        for (heading_ctx, content) in sections {
            let content = content.trim();
            if content.is_empty() {
                continue;
            }

            // Short sections merge into the previous chunk when the merge fits.
            if char_len(content) < self.min_chunk_size {
                if let Some(prev) = chunks.last_mut() {
                    let merged = format!("{}\n\n{}", prev.content, content);
                    if char_len(&merged) <= self.max_chunk_size {
                        prev.content = merged;
                        continue;
                    }
                }
            }

            if char_len(content) > self.max_chunk_size {
                for sub in self.split_long_text(content) {
                    chunks.push(Chunk {
                        content: sub,
                        heading_context: heading_ctx.clone(),
                        source: source.to_string(),
                        chunk_index: chunk_idx,
                        metadata: metadata.clone(),
                    });
                    chunk_idx += 1;
                }
            } else {
                chunks.push(Chunk {
                    content: content.to_string(),
                    heading_context: heading_ctx,
                    source: source.to_string(),
                    chunk_index: chunk_idx,
                    metadata: metadata.clone(),
                });
                chunk_idx += 1;
            }
        }

        chunks
    }

    /// Re-split an oversized section at sentence boundaries, carrying an
    /// `overlap_chars` tail from each sub-chunk into the next.
    fn split_long_text(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for sent in sentences {
            let sent_len = char_len(&sent);
            if current_len + sent_len > self.max_chunk_size && !current.is_empty() {
                let chunk_text = current.join(" ");

                if self.overlap_chars > 0 && !chunk_text.is_empty() {
                    let overlap = char_tail(&chunk_text, self.overlap_chars);
                    current_len = char_len(&overlap);
                    current = vec![overlap];
                } else {
                    current.clear();
                    current_len = 0;
                }

                chunks.push(chunk_text);
            }

            current_len += sent_len;
            current.push(sent);
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        if chunks.is_empty() {
            vec![text.to_string()]
        } else {
            chunks
        }
    }

    /// Fixed sliding windows for text without headings.
    fn chunk_plain(&self, text: &str, source: &str, metadata: &Metadata) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let step = self
            .max_chunk_size
            .saturating_sub(self.overlap_chars)
            .max(1);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut chunk_idx: i64 = 0;
        let mut pos = 0usize;

        while pos < chars.len() {
            let end = (pos + self.max_chunk_size).min(chars.len());
            let segment: String = chars[pos..end].iter().collect();
            let segment = segment.trim();

            if !segment.is_empty() && char_len(segment) >= self.min_chunk_size {
                chunks.push(Chunk {
                    content: segment.to_string(),
                    heading_context: String::new(),
                    source: source.to_string(),
                    chunk_index: chunk_idx,
                    metadata: metadata.clone(),
                });
                chunk_idx += 1;
            } else if !segment.is_empty() {
                // Trailing fragment: append to the last window instead of
                // emitting it alone.
                if let Some(prev) = chunks.last_mut() {
                    prev.content = format!("{}\n{}", prev.content, segment);
                }
            }

            pos += step;
        }

        chunks
    }
}

/// Split text into `(heading_context, section_content)` pairs.
///
/// Maintains a heading stack: each heading pops entries at or above its own
/// level, then pushes itself. The heading line stays part of its section's
/// content. Code fences toggle a flag under which lines pass through
/// untouched; an unterminated fence leaves the flag set, which degrades to
/// "no further heading detection" for the rest of the document.
fn split_by_headings(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut heading_stack: Vec<(usize, String)> = Vec::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut in_code_block = false;

    fn flush(
        sections: &mut Vec<(String, String)>,
        stack: &[(usize, String)],
        current: &mut Vec<&str>,
    ) {
        let content = current.join("\n");
        if !content.trim().is_empty() {
            sections.push((build_heading_context(stack), content));
        }
        current.clear();
    }

    for line in text.split('\n') {
        if line.starts_with("```") {
            in_code_block = !in_code_block;
            current_lines.push(line);
            continue;
        }

        if in_code_block {
            current_lines.push(line);
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            // Flush the running section before the stack changes.
            flush(&mut sections, &heading_stack, &mut current_lines);

            let level = caps[1].len();
            let title = caps[2].trim().to_string();

            while heading_stack.last().is_some_and(|(l, _)| *l >= level) {
                heading_stack.pop();
            }
            heading_stack.push((level, title));

            current_lines.push(line);
        } else {
            current_lines.push(line);
        }
    }

    flush(&mut sections, &heading_stack, &mut current_lines);

    sections
}

/// Render the heading stack as a breadcrumb string.
fn build_heading_context(stack: &[(usize, String)]) -> String {
    stack
        .iter()
        .map(|(level, title)| format!("{} {title}", "#".repeat(*level)))
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Split text into sentences at ASCII and CJK terminators followed by
/// whitespace. Terminators stay attached to their sentence; the separating
/// whitespace run is dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut after_terminator = false;

    for ch in text.chars() {
        if after_terminator && ch.is_whitespace() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
        after_terminator = matches!(ch, '.' | '!' | '?' | '。' | '！' | '？' | '\n');
    }

    if !current.is_empty() {
        sentences.push(current);
    }

    sentences
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s` (the whole string when shorter).
fn char_tail(s: &str, n: usize) -> String {
    let count = char_len(s);
    if count <= n {
        s.to_string()
    } else {
        s.chars().skip(count - n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, min: usize, overlap: usize) -> MarkdownChunker {
        MarkdownChunker::new(&ChunkerConfig {
            max_chunk_size: max,
            min_chunk_size: min,
            overlap_chars: overlap,
        })
    }

    const SAMPLE: &str = "# Project Overview\n\nThis is an agent system.\n\n## Architecture\n\nThe system uses a layered design.\n\n### Storage\n\nSQLite is the primary store.\n\n```python\ndef create_db():\n    conn = sqlite3.connect(\"app.db\")\n    return conn\n```\n\n### Network\n\nA REST API serves queries.\n\n## Deployment\n\nShipped as a single container.\n";

    #[test]
    fn empty_input_yields_no_chunks() {
        let c = chunker(1200, 100, 50);
        assert!(c.chunk("", "empty.md", None).is_empty());
        assert!(c.chunk("   \n\t  ", "empty.md", None).is_empty());
    }

    #[test]
    fn markdown_chunks_carry_source_and_order() {
        let c = chunker(1200, 10, 50);
        let chunks = c.chunk(SAMPLE, "test.md", None);
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source, "test.md");
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[test]
    fn heading_context_builds_breadcrumbs() {
        let c = chunker(1200, 10, 50);
        let chunks = c.chunk(SAMPLE, "test.md", None);
        let storage = chunks
            .iter()
            .find(|ch| ch.content.contains("SQLite is the primary store"))
            .expect("storage section chunk");
        assert_eq!(
            storage.heading_context,
            "# Project Overview > ## Architecture > ### Storage"
        );
    }

    #[test]
    fn heading_stack_pops_siblings() {
        let c = chunker(1200, 10, 50);
        let chunks = c.chunk(SAMPLE, "test.md", None);
        let deploy = chunks
            .iter()
            .find(|ch| ch.content.contains("single container"))
            .expect("deployment chunk");
        // "## Deployment" pops both "### ..." and "## Architecture".
        assert_eq!(deploy.heading_context, "# Project Overview > ## Deployment");
    }

    #[test]
    fn small_document_keeps_breadcrumb_and_content() {
        let c = chunker(100, 10, 20);
        let chunks = c.chunk(
            "# Intro\n\nPython is a language.\n\n## Details\n\nIt uses dynamic typing.",
            "a.md",
            None,
        );
        assert!(chunks
            .iter()
            .any(|ch| ch.heading_context.contains("Intro") && ch.content.contains("Python")));
    }

    #[test]
    fn code_fence_is_not_split_or_parsed_as_heading() {
        let text = "# Example\n\n```python\n# not a heading\ndef f():\n    return 1 + 2 + 3\n```\n\nText after the code.\n";
        let c = chunker(500, 10, 50);
        let chunks = c.chunk(text, "code.md", None);

        let code_chunk = chunks
            .iter()
            .find(|ch| ch.content.contains("def f():"))
            .expect("code chunk");
        assert!(code_chunk.content.contains("return 1 + 2 + 3"));
        // The commented line inside the fence must not become a breadcrumb.
        assert!(!chunks
            .iter()
            .any(|ch| ch.heading_context.contains("not a heading")));
    }

    #[test]
    fn unterminated_fence_degrades_gracefully() {
        let text = "# Top\n\nBefore.\n\n```\ncode without closing fence\n# swallowed heading\nmore code\n";
        let c = chunker(1200, 5, 50);
        let chunks = c.chunk(text, "bad.md", None);
        assert!(!chunks.is_empty());
        // Everything after the open fence stays in one section under "# Top".
        assert!(!chunks
            .iter()
            .any(|ch| ch.heading_context.contains("swallowed")));
    }

    #[test]
    fn short_section_merges_into_previous() {
        let text = "# A\n\nThis first section is comfortably long enough to stand alone as a chunk.\n\n## B\n\nTiny.\n";
        let c = chunker(1200, 100, 50);
        let chunks = c.chunk(text, "merge.md", None);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Tiny."));
        assert!(chunks[0].heading_context.contains("# A"));
    }

    #[test]
    fn long_section_splits_with_overlap() {
        let sentence = "This sentence pads the section out to force a split. ";
        let body = sentence.repeat(20);
        let text = format!("# Long\n\n{body}");
        let c = chunker(300, 50, 40);
        let chunks = c.chunk(&text, "long.md", None);
        assert!(chunks.len() > 1, "expected re-split, got {}", chunks.len());
        for ch in &chunks {
            assert!(ch.heading_context.contains("Long"));
        }
        // Each follow-up chunk starts with the tail of its predecessor.
        for pair in chunks.windows(2) {
            let tail = char_tail(&pair[0].content, 40);
            assert!(
                pair[1].content.starts_with(&tail),
                "continuity window missing between sub-chunks"
            );
        }
    }

    #[test]
    fn plain_text_uses_fixed_windows() {
        let text = "plain text without any headings at all ".repeat(20);
        let c = chunker(100, 10, 20);
        let chunks = c.chunk(&text, "plain.txt", None);
        assert!(chunks.len() > 1);
        for ch in &chunks {
            assert!(ch.heading_context.is_empty());
            assert!(ch.char_count() <= 100 + 20 + 1);
        }
    }

    #[test]
    fn plain_text_trailing_fragment_appends_to_previous() {
        // 110 chars: one full window of 100 plus a fragment below min size.
        let text = "x".repeat(95) + " tail piece here";
        let c = chunker(100, 50, 0);
        let chunks = c.chunk(&text, "plain.txt", None);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("tail"));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let c = chunker(300, 50, 40);
        let a = c.chunk(SAMPLE, "t.md", None);
        let b = c.chunk(SAMPLE, "t.md", None);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content, y.content);
            assert_eq!(x.heading_context, y.heading_context);
        }
    }

    #[test]
    fn cjk_content_never_splits_mid_character() {
        let text = "这是一段没有标题的中文纯文本，用来验证分块不会在字符中间切断。".repeat(10);
        let c = chunker(50, 10, 10);
        // Would panic on a byte-indexed slice; char windows must not.
        let chunks = c.chunk(&text, "cjk.txt", None);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn sentence_split_keeps_terminators() {
        let parts = split_sentences("First one. Second one! Third?");
        assert_eq!(parts, vec!["First one.", "Second one!", "Third?"]);
    }

    #[test]
    fn sentence_split_handles_cjk_terminators() {
        let parts = split_sentences("第一句。 第二句！ 第三句");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "第一句。");
    }
}
