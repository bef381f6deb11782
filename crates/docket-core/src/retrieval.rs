//! Retrieval - case document lookup
//!
//! [`Retriever`] is the seam agents use (through the `search_documents`
//! tool) to fetch context. [`DirectoryRetriever`] serves plain-text case
//! folders from disk and ranks paragraphs by term overlap with the query.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};


/// Paragraphs shorter than this are merged into the next one
const MIN_CHUNK_CHARS: usize = 80;
/// Paragraphs longer than this are split on sentence boundaries
const MAX_CHUNK_CHARS: usize = 1_500;

/// A ranked piece of a case document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// File name within the case folder
    pub document: String,
    /// Position of the chunk within its document
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Relevance score (higher is better)
    pub score: f32,
}

/// Source of case document chunks
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Top `k` chunks of `case_id` for `query`
    async fn retrieve(&self, case_id: &str, query: &str, k: usize) -> Result<Vec<DocumentChunk>>;
}

/// Reads `<root>/<case_id>/*.txt` and `*.md`
#[derive(Debug, Clone)]
pub struct DirectoryRetriever {
    root: PathBuf,
}

impl DirectoryRetriever {
    /// Serve case folders under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn case_dir(&self, case_id: &str) -> Result<PathBuf> {
        let trimmed = case_id.trim();
        if trimmed.is_empty()
            || trimmed.contains(['/', '\\'])
            || trimmed.contains("..")
            || trimmed.starts_with('.')
        {
            return Err(Error::Validation(format!("invalid case id: {case_id:?}")));
        }
        Ok(self.root.join(trimmed))
    }

    async fn load_documents(&self, dir: &Path) -> Result<Vec<(String, String)>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::Retrieval(format!("{}: {e}", dir.display())))?;

        let mut documents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?
        {
            let path = entry.path();
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
            if !supported {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => documents.push((name, text)),
                Err(e) => warn!(document = %name, error = %e, "Skipping unreadable document"),
            }
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }
}

#[async_trait::async_trait]
impl Retriever for DirectoryRetriever {
    async fn retrieve(&self, case_id: &str, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        let dir = self.case_dir(case_id)?;
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(case_id = %case_id, dir = %dir.display(), "Case folder not found");
            return Ok(Vec::new());
        }

        let documents = self.load_documents(&dir).await?;
        let terms = tokenize(query);
        let terms = &terms;

        let mut chunks: Vec<DocumentChunk> = documents
            .iter()
            .flat_map(|(name, text)| {
                split_chunks(text)
                    .into_iter()
                    .enumerate()
                    .map(move |(index, text)| DocumentChunk {
                        document: name.clone(),
                        index,
                        score: score(terms, &text),
                        text,
                    })
            })
            .collect();

        chunks.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document.cmp(&b.document))
                .then_with(|| a.index.cmp(&b.index))
        });
        chunks.truncate(k);

        debug!(
            case_id = %case_id,
            documents = documents.len(),
            returned = chunks.len(),
            "Retrieved chunks"
        );
        Ok(chunks)
    }
}

static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("WORD_REGEX is a compile-time constant"));

/// Lower-cased word tokens of at least two characters
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    WORD_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// Fraction of distinct query terms present, weighted by log term frequency
pub(crate) fn score(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let words = tokenize(text);
    let distinct: HashSet<&str> = terms.iter().map(String::as_str).collect();

    distinct
        .iter()
        .map(|term| {
            let hits = words.iter().filter(|w| w.as_str() == *term).count();
            (hits as f32).ln_1p()
        })
        .sum::<f32>()
        / distinct.len() as f32
}

/// Paragraph chunks; short paragraphs merge forward, long ones split
pub(crate) fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);

        if current.len() >= MIN_CHUNK_CHARS {
            chunks.extend(split_long(&current));
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        chunks.extend(split_long(&current));
    }
    chunks
}

fn split_long(text: &str) -> Vec<String> {
    if text.len() <= MAX_CHUNK_CHARS {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for sentence in text.split_inclusive(". ") {
        if current.len() + sentence.len() > MAX_CHUNK_CHARS && !current.is_empty() {
            pieces.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}
