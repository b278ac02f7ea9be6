//! # Concept Signature Extraction
//!
//! Pure derivation of a `ConceptSignature` from artifact content, plus the
//! overlap measures the semantic strategy scores with.
//!
//! Everything here is deterministic and allocation-bounded: fixed stopword
//! set, fixed tokenizer, no I/O, no oracle. Two extractions of the same
//! content yield identical signatures.

use crate::ConceptSignature;
use std::collections::{BTreeMap, BTreeSet};

/// Tokens shorter than this never become concepts.
const MIN_CONCEPT_LENGTH: usize = 3;

/// Fixed stopword set for term extraction.
///
/// Deliberately small: discovery scoring needs stable noise suppression,
/// not linguistic completeness.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will",
    "with",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase alphanumeric tokens of a content string, in order.
pub(crate) fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse a declared abstraction layer from a `layer: N` line.
///
/// First matching line wins; content with no declaration has no layer.
fn parse_layer(content: &str) -> Option<i64> {
    for line in content.lines() {
        let trimmed = line.trim();
        let lowered = trimmed.to_lowercase();
        if let Some(rest) = lowered.strip_prefix("layer:") {
            if let Ok(layer) = rest.trim().parse::<i64>() {
                return Some(layer);
            }
        }
    }
    None
}

/// Build the signature for one artifact's content.
///
/// `terms` is the non-stopword token multiset; `concepts` the distinct
/// tokens long enough to carry meaning; `layer` the declared layer if any.
#[must_use]
pub fn extract(content: &str) -> ConceptSignature {
    let mut terms: BTreeMap<String, u32> = BTreeMap::new();
    let mut concepts: BTreeSet<String> = BTreeSet::new();

    for token in tokenize(content) {
        if is_stopword(&token) {
            continue;
        }
        if token.len() >= MIN_CONCEPT_LENGTH {
            concepts.insert(token.clone());
        }
        let count = terms.entry(token).or_insert(0);
        *count = count.saturating_add(1);
    }

    ConceptSignature {
        concepts,
        terms,
        layer: parse_layer(content),
    }
}

// =============================================================================
// OVERLAP MEASURES
// =============================================================================

/// Jaccard overlap of two concept sets, in [0, 1].
///
/// Two empty sets share nothing: the overlap is 0, not 1.
#[must_use]
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Cosine similarity of two term-frequency multisets, in [0, 1].
#[must_use]
pub fn cosine(a: &BTreeMap<String, u32>, b: &BTreeMap<String, u32>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot: f64 = 0.0;
    for (term, count_a) in a {
        if let Some(count_b) = b.get(term) {
            dot += f64::from(*count_a) * f64::from(*count_b);
        }
    }

    let norm_a: f64 = a.values().map(|c| f64::from(*c) * f64::from(*c)).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|c| f64::from(*c) * f64::from(*c)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
