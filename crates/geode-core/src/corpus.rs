//! # Corpus Provider
//!
//! The artifact source the discovery strategies read candidates from.
//!
//! A corpus may be a full materialization or a paginated, iterate-once
//! cursor; the engine accepts either through the same trait and never
//! assumes it can rewind. Draining is capped: hitting the cap is reported
//! as truncation, not failure.

use crate::GeodeError;
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// One artifact: an id the edges will point at, and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub content: String,
}

impl Document {
    /// Create a document.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

// =============================================================================
// CORPUS TRAIT
// =============================================================================

/// A source of candidate documents.
///
/// `next_doc` yields each document at most once; `None` means exhausted.
/// Implementations may be backed by memory, pagination, or anything else —
/// the engine only ever iterates forward.
pub trait Corpus {
    /// The next document, or `None` when the corpus is exhausted.
    fn next_doc(&mut self) -> Result<Option<Document>, GeodeError>;
}

/// Drain a corpus into memory, up to `cap` documents.
///
/// Returns the documents in corpus order and whether the cap cut the
/// corpus short. Partial results are usable; truncation is a flag, never
/// an error.
pub fn drain(corpus: &mut dyn Corpus, cap: usize) -> Result<(Vec<Document>, bool), GeodeError> {
    let mut docs = Vec::new();
    while docs.len() < cap {
        match corpus.next_doc()? {
            Some(doc) => docs.push(doc),
            None => return Ok((docs, false)),
        }
    }
    // Cap reached: truncated only if at least one more document exists.
    let truncated = corpus.next_doc()?.is_some();
    Ok((docs, truncated))
}

// =============================================================================
// IMPLEMENTATIONS
// =============================================================================

/// Materialized corpus over an id -> content map.
///
/// Yields documents in ascending id order for determinism.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    docs: VecDeque<Document>,
}

impl MemoryCorpus {
    /// Build from an id -> content map.
    #[must_use]
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self {
            docs: map
                .into_iter()
                .map(|(id, content)| Document { id, content })
                .collect(),
        }
    }

    /// Build from (id, content) pairs; order is preserved.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            docs: pairs
                .into_iter()
                .map(|(id, content)| Document { id, content })
                .collect(),
        }
    }
}

impl Corpus for MemoryCorpus {
    fn next_doc(&mut self) -> Result<Option<Document>, GeodeError> {
        Ok(self.docs.pop_front())
    }
}

/// Iterate-once cursor adapter over any document iterator.
#[derive(Debug)]
pub struct CursorCorpus<I> {
    inner: I,
}

impl<I> CursorCorpus<I>
where
    I: Iterator<Item = Document>,
{
    /// Wrap an iterator as a corpus.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> Corpus for CursorCorpus<I>
where
    I: Iterator<Item = Document>,
{
    fn next_doc(&mut self) -> Result<Option<Document>, GeodeError> {
        Ok(self.inner.next())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn memory_corpus_yields_in_id_order() {
        let mut corpus = MemoryCorpus::new(map_of(&[("b", "2"), ("a", "1")]));
        let first = corpus.next_doc().expect("next").expect("doc");
        assert_eq!(first.id, "a");
        let second = corpus.next_doc().expect("next").expect("doc");
        assert_eq!(second.id, "b");
        assert!(corpus.next_doc().expect("next").is_none());
    }

    #[test]
    fn drain_below_cap_is_not_truncated() {
        let mut corpus = MemoryCorpus::new(map_of(&[("a", "1"), ("b", "2")]));
        let (docs, truncated) = drain(&mut corpus, 10).expect("drain");
        assert_eq!(docs.len(), 2);
        assert!(!truncated);
    }

    #[test]
    fn drain_at_exact_cap_is_not_truncated() {
        let mut corpus = MemoryCorpus::new(map_of(&[("a", "1"), ("b", "2")]));
        let (docs, truncated) = drain(&mut corpus, 2).expect("drain");
        assert_eq!(docs.len(), 2);
        assert!(!truncated);
    }

    #[test]
    fn drain_over_cap_reports_truncation() {
        let mut corpus = MemoryCorpus::new(map_of(&[("a", "1"), ("b", "2"), ("c", "3")]));
        let (docs, truncated) = drain(&mut corpus, 2).expect("drain");
        assert_eq!(docs.len(), 2);
        assert!(truncated);
    }

    #[test]
    fn cursor_corpus_iterates_once() {
        let docs = vec![Document::new("a", "1"), Document::new("b", "2")];
        let mut corpus = CursorCorpus::new(docs.into_iter());
        assert!(corpus.next_doc().expect("next").is_some());
        assert!(corpus.next_doc().expect("next").is_some());
        assert!(corpus.next_doc().expect("next").is_none());
    }
}
