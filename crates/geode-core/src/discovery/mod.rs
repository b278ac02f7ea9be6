//! # Edge Discovery Engine
//!
//! Four independent strategies infer typed, confidence-scored edges from
//! one source artifact against a corpus of candidates:
//!
//! - `explicit`: structured references classified by cue words
//! - `semantic`: concept-signature overlap scoring
//! - `structural`: layer-adjacent lineage pairs
//! - `contradiction`: negation against positive assertion
//!
//! Confidence bands are fixed in `primitives`, not caller-tunable, so any
//! two runs over the same snapshot produce identical edge lists. Results
//! are concatenated without merging: an explicit link and a semantic
//! similarity between the same pair are distinct evidence and both
//! retained. Strategies are pure and never call the distance oracle.

mod contradiction;
mod explicit;
mod semantic;
mod structural;

use crate::corpus::{self, Corpus, Document};
use crate::primitives::MAX_CORPUS_DOCS;
use crate::{DiscoveredEdge, GeodeError};

/// The outcome of one discovery run.
///
/// `truncated` is raised when the corpus cap cut candidates off; the edges
/// present are still valid. Truncation is never an error.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReport {
    pub edges: Vec<DiscoveredEdge>,
    pub truncated: bool,
}

/// The engine is stateless; strategies read only their inputs.
pub struct EdgeDiscoveryEngine;

impl EdgeDiscoveryEngine {
    /// Run all four strategies for `source` against `corpus`.
    ///
    /// The corpus is drained once (materialized maps and iterate-once
    /// cursors behave identically) under the compiled document cap.
    /// Edge order is strategy order, then corpus order within a strategy.
    pub fn discover(
        source: &Document,
        corpus: &mut dyn Corpus,
    ) -> Result<DiscoveryReport, GeodeError> {
        let (docs, truncated) = corpus::drain(corpus, MAX_CORPUS_DOCS)?;
        Ok(Self::discover_drained(source, &docs, truncated))
    }

    /// Strategy pass over already-drained candidates.
    ///
    /// Split out so crystallization can reuse one drained corpus across
    /// calls without re-reading an iterate-once cursor.
    #[must_use]
    pub fn discover_drained(
        source: &Document,
        docs: &[Document],
        truncated: bool,
    ) -> DiscoveryReport {
        let mut edges = Vec::new();
        edges.extend(explicit::discover(source, docs));
        edges.extend(semantic::discover(source, docs));
        edges.extend(structural::discover(source, docs));
        edges.extend(contradiction::discover(source, docs));

        tracing::debug!(
            source = %source.id,
            candidates = docs.len(),
            edges = edges.len(),
            truncated,
            "discovery run complete"
        );
        DiscoveryReport { edges, truncated }
    }
}

// =============================================================================
// TESTS
// =============================================================================
