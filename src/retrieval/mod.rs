//! Lexical document retrieval
//!
//! Markdown documents are split into paragraph chunks and ranked with BM25
//! through an in-RAM tantivy index. The index is read-only once built and is
//! shared by every run; nothing is persisted across restarts.

pub mod lexical;

pub use lexical::{tokenize, LexicalIndex};

use crate::models::{DocumentChunk, ScoredChunk};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Where the corpus comes from
#[derive(Debug, Clone)]
enum CorpusSource {
    Directory(PathBuf),
    Documents(Vec<(String, String)>),
}

/// Chunks plus the lexical index built over them
#[derive(Debug)]
pub struct IndexedCorpus {
    chunks: Vec<DocumentChunk>,
    lexical: Option<LexicalIndex>,
    fingerprint: String,
}

impl IndexedCorpus {
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Document index, built on first use (or eagerly via [`DocumentIndex::ensure_built`]).
#[derive(Debug)]
pub struct DocumentIndex {
    source: CorpusSource,
    built: OnceLock<IndexedCorpus>,
}

impl DocumentIndex {
    /// Index every `*.md` file directly inside `dir`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: CorpusSource::Directory(dir.into()),
            built: OnceLock::new(),
        }
    }

    /// Index in-memory `(document name, content)` pairs
    pub fn from_documents(documents: Vec<(String, String)>) -> Self {
        Self {
            source: CorpusSource::Documents(documents),
            built: OnceLock::new(),
        }
    }

    /// Build the index if it has not been built yet. Idempotent.
    pub fn ensure_built(&self) -> &IndexedCorpus {
        self.built.get_or_init(|| build_corpus(&load_documents(&self.source)))
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        self.ensure_built().chunks()
    }

    pub fn fingerprint(&self) -> &str {
        self.ensure_built().fingerprint()
    }

    /// Top-`k` chunks by BM25 score. Zero-score chunks are never returned;
    /// ties keep index order.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        let corpus = self.ensure_built();
        if corpus.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let Some(lexical) = corpus.lexical.as_ref() else {
            return Vec::new();
        };

        match lexical.score(query) {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|(position, score)| {
                    corpus.chunks.get(position).map(|chunk| ScoredChunk::from_chunk(chunk, score))
                })
                .take(k)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Lexical search failed");
                Vec::new()
            }
        }
    }
}

/// Split one document into paragraph chunks.
/// The ordinal is the paragraph's position before empty paragraphs are dropped.
pub fn chunk_document(name: &str, content: &str) -> Vec<DocumentChunk> {
    let normalized = content.replace("\r\n", "\n");

    normalized
        .split("\n\n")
        .enumerate()
        .filter_map(|(ordinal, raw)| {
            let text = raw.trim();
            if text.is_empty() {
                return None;
            }
            Some(DocumentChunk {
                id: format!("{}::chunk{}", name, ordinal),
                content: text.to_string(),
                source: name.to_string(),
            })
        })
        .collect()
}

/// Chunk and index a set of documents. An index that fails to build
/// leaves the corpus unsearchable rather than failing the caller.
pub fn build_corpus(documents: &[(String, String)]) -> IndexedCorpus {
    let chunks: Vec<DocumentChunk> = documents
        .iter()
        .flat_map(|(name, content)| chunk_document(name, content))
        .collect();

    let lexical = match LexicalIndex::build(&chunks) {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(error = %e, "Failed to build lexical index");
            None
        }
    };
    let fingerprint = corpus_fingerprint(&chunks);

    if chunks.is_empty() {
        warn!("No documents found to index");
    } else {
        info!(
            chunks = chunks.len(),
            documents = documents.len(),
            fingerprint = %fingerprint,
            "Document index built"
        );
    }

    IndexedCorpus {
        chunks,
        lexical,
        fingerprint,
    }
}

fn corpus_fingerprint(chunks: &[DocumentChunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn load_documents(source: &CorpusSource) -> Vec<(String, String)> {
    match source {
        CorpusSource::Documents(documents) => documents.clone(),
        CorpusSource::Directory(dir) => read_markdown_dir(dir),
    }
}

/// Read `*.md` files sorted by name. Unreadable entries are skipped.
fn read_markdown_dir(dir: &Path) -> Vec<(String, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Docs directory unavailable");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "md"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            match fs::read_to_string(&path) {
                Ok(content) => Some((name, content)),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable document");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_documents() -> Vec<(String, String)> {
        vec![
            (
                "product_policy.md".to_string(),
                "# Returns Policy\n\nBeverages unopened: 14 days return window.\n\n\n\nPerishables (Dairy, Seafood): 3-7 days.".to_string(),
            ),
            (
                "marketing_calendar.md".to_string(),
                "# Marketing Calendar 1997\n\nSummer Beverages 1997: dates 1997-06-01 to 1997-06-30.\n\nWinter Classics 1997: dates 1997-12-01 to 1997-12-31.".to_string(),
            ),
            (
                "kpi_definitions.md".to_string(),
                "# KPI Definitions\n\nAverage Order Value (AOV) = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID).\n\nGross Margin = SUM((UnitPrice - CostOfGoods) * Quantity * (1 - Discount)).".to_string(),
            ),
        ]
    }

    #[test]
    fn test_chunk_ids_use_paragraph_ordinal() {
        let chunks = chunk_document("doc.md", "first\n\nsecond\n\n\n\nthird");
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        // "\n\n\n\n" leaves an empty paragraph at ordinal 2
        assert_eq!(ids, vec!["doc.md::chunk0", "doc.md::chunk1", "doc.md::chunk3"]);
        assert!(chunks.iter().all(|c| c.source == "doc.md"));
        assert_eq!(chunks[2].content, "third");
    }

    #[test]
    fn test_chunk_ids_unique_and_stable_across_builds() {
        let first = build_corpus(&sample_documents());
        let second = build_corpus(&sample_documents());

        let ids: Vec<&str> = first.chunks().iter().map(|c| c.id.as_str()).collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());

        let again: Vec<&str> = second.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, again);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_search_sorted_positive_and_bounded() {
        let index = DocumentIndex::from_documents(sample_documents());
        for query in ["beverages 1997", "return window days", "average order value", "summer"] {
            for k in [1, 2, 3, 10] {
                let results = index.search(query, k);
                assert!(results.len() <= k);
                assert!(results.iter().all(|c| c.score > 0.0));
                assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
            }
        }
    }

    #[test]
    fn test_search_finds_relevant_chunk() {
        let index = DocumentIndex::from_documents(sample_documents());
        let results = index.search("Summer Beverages 1997 dates", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "marketing_calendar.md::chunk1");
    }

    #[test]
    fn test_search_with_no_overlap_returns_nothing() {
        let index = DocumentIndex::from_documents(sample_documents());
        assert!(index.search("zebra xylophone", 3).is_empty());
    }

    #[test]
    fn test_common_terms_do_not_hide_stronger_matches() {
        let index = DocumentIndex::from_documents(vec![(
            "doc.md".to_string(),
            "x y z\n\nx x z\n\nx y\n\nx y\n\nx y".to_string(),
        )]);

        let results = index.search("x z", 2);
        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc.md::chunk1", "doc.md::chunk0"]);
        assert!(results[0].score >= results[1].score);
        assert_eq!(index.search("x z", 10).len(), 5);
    }

    #[test]
    fn test_empty_corpus_returns_empty() {
        let index = DocumentIndex::from_documents(vec![]);
        assert!(index.search("anything", 3).is_empty());
        assert!(index.chunks().is_empty());
    }

    #[test]
    fn test_lazy_and_eager_builds_agree() {
        let lazy = DocumentIndex::from_documents(sample_documents());
        let eager = DocumentIndex::from_documents(sample_documents());
        eager.ensure_built();
        eager.ensure_built();

        assert_eq!(lazy.search("beverages", 3), eager.search("beverages", 3));
    }

    #[test]
    fn test_directory_loading_skips_non_markdown_and_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "beta paragraph\n\nsecond beta").unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha paragraph").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored text").unwrap();
        std::fs::write(dir.path().join("broken.md"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let index = DocumentIndex::from_dir(dir.path());
        let ids: Vec<&str> = index.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md::chunk0", "b.md::chunk0", "b.md::chunk1"]);

        let missing = DocumentIndex::from_dir(dir.path().join("does-not-exist"));
        assert!(missing.search("alpha", 3).is_empty());
    }
}
