//! Token-bounded text chunker with overlap.
//!
//! Splits document body text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit, measured with a real subword tokenizer (tiktoken
//! cl100k_base). The advanced path splits recursively on an ordered
//! separator hierarchy — markdown structure first, then paragraphs, lines,
//! sentence and clause punctuation, spaces, and finally raw characters —
//! and carries `overlap_tokens` of trailing context into each next chunk.
//!
//! Whenever the advanced path is unavailable (tokenizer failed to load) or
//! disabled, a word-window fallback takes over; the method actually used is
//! recorded in the [`ChunkingReport`].

use std::time::{Duration, Instant};

use tiktoken_rs::CoreBPE;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Which splitting strategy produced a chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMethod {
    /// Recursive separator splitting with subword token counts.
    Advanced,
    /// Whitespace word-window with 0.75 words-per-token factors.
    Basic,
}

/// Diagnostics reported by [`Chunker::chunk_with_metadata`].
#[derive(Debug, Clone)]
pub struct ChunkingReport {
    pub total_chunks: usize,
    pub method: ChunkMethod,
    pub avg_tokens: f64,
    pub avg_chars: f64,
    pub total_tokens: usize,
    pub elapsed: Duration,
}

/// A separator in the recursive hierarchy. Prefix separators start the
/// following segment (headers, fences); suffix separators end the
/// preceding one (punctuation, whitespace).
struct Separator {
    pat: &'static str,
    prefix: bool,
}

const fn prefix(pat: &'static str) -> Separator {
    Separator { pat, prefix: true }
}
const fn suffix(pat: &'static str) -> Separator {
    Separator { pat, prefix: false }
}

fn separators(config: &ChunkingConfig) -> Vec<Separator> {
    let mut seps = Vec::new();
    if config.preserve_markdown {
        seps.push(prefix("\n# "));
        seps.push(prefix("\n## "));
        seps.push(prefix("\n### "));
        seps.push(prefix("\n#### "));
        seps.push(prefix("\n---\n"));
        seps.push(prefix("\n***\n"));
    }
    if config.preserve_code_blocks {
        seps.push(prefix("\n```"));
    }
    seps.push(suffix("\n\n"));
    seps.push(suffix("\n"));
    seps.push(suffix(". "));
    seps.push(suffix("! "));
    seps.push(suffix("? "));
    seps.push(suffix("; "));
    seps.push(suffix(", "));
    seps.push(suffix(" "));
    seps
}

/// Chunker holding a lazily-built tokenizer encoder.
///
/// Construction never fails: if the encoder cannot be built, every call
/// degrades to the basic word-window method.
pub struct Chunker {
    encoder: Option<CoreBPE>,
}

impl Chunker {
    pub fn new() -> Self {
        Self {
            encoder: tiktoken_rs::cl100k_base().ok(),
        }
    }

    /// Split `text` into ordered chunks for `parent_id`.
    ///
    /// Empty or whitespace-only text yields zero chunks; text within the
    /// token budget yields exactly one.
    pub fn chunk(&self, parent_id: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
        self.chunk_with_metadata(parent_id, text, config).0
    }

    /// Like [`chunk`](Chunker::chunk), additionally reporting chunk-count,
    /// method, and token/char averages for diagnostics.
    pub fn chunk_with_metadata(
        &self,
        parent_id: &str,
        text: &str,
        config: &ChunkingConfig,
    ) -> (Vec<Chunk>, ChunkingReport) {
        let started = Instant::now();
        let max_tokens = config.max_tokens.max(1);
        // Clamp rather than reject: a runaway overlap would stall the window.
        let overlap = config.overlap_tokens.min(max_tokens / 2);

        if text.trim().is_empty() {
            let report = ChunkingReport {
                total_chunks: 0,
                method: ChunkMethod::Basic,
                avg_tokens: 0.0,
                avg_chars: 0.0,
                total_tokens: 0,
                elapsed: started.elapsed(),
            };
            return (Vec::new(), report);
        }

        let (texts, method) = if config.use_advanced_chunking {
            match self.advanced_chunks(text, max_tokens, overlap, config) {
                Some(chunks) if !chunks.is_empty() => (chunks, ChunkMethod::Advanced),
                _ => (basic_chunks(text, max_tokens, overlap), ChunkMethod::Basic),
            }
        } else {
            (basic_chunks(text, max_tokens, overlap), ChunkMethod::Basic)
        };

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .enumerate()
            .map(|(index, text)| {
                let token_count = self.token_count(&text);
                let char_count = text.chars().count();
                Chunk {
                    parent_id: parent_id.to_string(),
                    index,
                    text,
                    token_count,
                    char_count,
                }
            })
            .collect();

        let total_tokens: usize = chunks.iter().map(|c| c.token_count).sum();
        let total_chars: usize = chunks.iter().map(|c| c.char_count).sum();
        let n = chunks.len();
        let report = ChunkingReport {
            total_chunks: n,
            method,
            avg_tokens: if n == 0 { 0.0 } else { total_tokens as f64 / n as f64 },
            avg_chars: if n == 0 { 0.0 } else { total_chars as f64 / n as f64 },
            total_tokens,
            elapsed: started.elapsed(),
        };
        (chunks, report)
    }

    /// Token count of `text`; word-based estimate when no encoder is loaded.
    pub fn token_count(&self, text: &str) -> usize {
        match &self.encoder {
            Some(enc) => enc.encode_ordinary(text).len(),
            None => estimate_tokens(text),
        }
    }

    fn advanced_chunks(
        &self,
        text: &str,
        max_tokens: usize,
        overlap: usize,
        config: &ChunkingConfig,
    ) -> Option<Vec<String>> {
        let enc = self.encoder.as_ref()?;
        let seps = separators(config);
        let fragments = split_recursive(enc, text, &seps, max_tokens);
        Some(self.merge_with_overlap(fragments, max_tokens, overlap))
    }

    /// Merge fragments up to `max_tokens`, carrying `overlap` tokens of
    /// trailing context into the next chunk.
    fn merge_with_overlap(
        &self,
        fragments: Vec<String>,
        max_tokens: usize,
        overlap: usize,
    ) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut buf = String::new();

        for frag in fragments {
            if frag.trim().is_empty() {
                continue;
            }
            if buf.is_empty() {
                buf = frag;
                continue;
            }
            // Fragments kept their separators, so plain concatenation
            // reconstructs the original text.
            let candidate = format!("{}{}", buf, frag);
            if self.token_count(&candidate) <= max_tokens {
                buf = candidate;
            } else {
                let tail = self.trailing_context(&buf, overlap);
                chunks.push(std::mem::take(&mut buf));
                buf = self.seed_with_overlap(&tail, frag, max_tokens);
            }
        }
        if !buf.trim().is_empty() {
            chunks.push(buf);
        }
        chunks
    }

    /// Start the next chunk from `frag`, prefixing as much of the overlap
    /// tail as still fits the token budget. A fragment already near the
    /// budget gets a shortened tail or none; the budget always wins.
    fn seed_with_overlap(&self, tail: &str, frag: String, max_tokens: usize) -> String {
        let mut words: Vec<&str> = tail.split_whitespace().collect();
        while !words.is_empty() {
            let prefix = words.join(" ");
            let candidate = if frag.starts_with(char::is_whitespace) {
                format!("{}{}", prefix, frag)
            } else {
                format!("{} {}", prefix, frag)
            };
            if self.token_count(&candidate) <= max_tokens {
                return candidate;
            }
            words.remove(0);
        }
        frag
    }

    /// Suffix of `text` spanning roughly `overlap` tokens, on word
    /// boundaries. Empty when overlap is zero.
    fn trailing_context(&self, text: &str, overlap: usize) -> String {
        if overlap == 0 {
            return String::new();
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut taken = 0usize;
        while taken < words.len() {
            taken += 1;
            let tail = words[words.len() - taken..].join(" ");
            if self.token_count(&tail) >= overlap {
                return tail;
            }
        }
        // Whole text is shorter than the overlap budget.
        words.join(" ")
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Split on the first separator present; recurse into oversized pieces
/// with the remaining, finer separators. Bottoms out at raw characters.
fn split_recursive(
    enc: &CoreBPE,
    text: &str,
    seps: &[Separator],
    max_tokens: usize,
) -> Vec<String> {
    if enc.encode_ordinary(text).len() <= max_tokens {
        return vec![text.to_string()];
    }
    for (i, sep) in seps.iter().enumerate() {
        let parts = split_keep(text, sep.pat, sep.prefix);
        if parts.len() > 1 {
            return parts
                .into_iter()
                .flat_map(|p| {
                    if enc.encode_ordinary(&p).len() <= max_tokens {
                        vec![p]
                    } else {
                        split_recursive(enc, &p, &seps[i + 1..], max_tokens)
                    }
                })
                .collect();
        }
    }
    hard_split_chars(text, max_tokens)
}

/// Split on `sep`, keeping the separator attached to the following piece
/// (`prefix_attach`) or the preceding one.
fn split_keep(text: &str, sep: &str, prefix_attach: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut search = 0usize;
    while let Some(rel) = text[search..].find(sep) {
        let pos = search + rel;
        let cut = if prefix_attach { pos } else { pos + sep.len() };
        if cut > start && !text[start..cut].trim().is_empty() {
            out.push(text[start..cut].to_string());
        }
        start = cut.max(start);
        search = pos + sep.len();
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        out.push(text[start..].to_string());
    }
    out
}

/// Last resort: cut on char boundaries at ~4 chars per token.
fn hard_split_chars(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens.saturating_mul(4).max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Word-count estimate at 0.75 words per token.
fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 / 0.75).ceil() as usize
}

/// Fallback splitter: slide a word window of `max_tokens * 0.75` words
/// with `overlap_tokens * 0.75` words of overlap.
fn basic_chunks(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let max_words = ((max_tokens as f64 * 0.75) as usize).max(1);
    let overlap_words = ((overlap_tokens as f64 * 0.75) as usize).min(max_words - 1);
    let step = (max_words - overlap_words).max(1);

    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_words).min(words.len());
        out.push(words[start..end].join(" "));
        if end >= words.len() {
            break;
        }
        start += step;
    }
    out
}
