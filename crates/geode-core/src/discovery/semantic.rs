//! # Semantic Similarity Strategy
//!
//! Scores concept signatures of the source against every candidate:
//! `score = 0.5 * jaccard(concepts) + 0.5 * cosine(term frequencies)`.
//!
//! Two bands: concept overlap alone past the mention floor emits
//! `mentions`; the combined score past the similarity floor emits
//! `similar_to` with confidence scaled by the score. Both can fire for the
//! same pair — they are distinct evidence and both retained.

use crate::corpus::Document;
use crate::primitives::{
    MENTIONS_CONFIDENCE, MENTION_OVERLAP_FLOOR, SIMILARITY_BASE, SIMILARITY_FLOOR,
    SIMILARITY_SCALE,
};
use crate::signature::{cosine, extract, jaccard};
use crate::{Confidence, DiscoveredEdge, EdgeKind};

/// Shared concepts quoted in edge context, at most.
const CONTEXT_CONCEPTS: usize = 5;

fn shared_concepts(a: &crate::ConceptSignature, b: &crate::ConceptSignature) -> Vec<String> {
    a.concepts.intersection(&b.concepts).take(CONTEXT_CONCEPTS).cloned().collect()
}

/// Run the semantic strategy for one source against drained candidates.
#[must_use]
pub fn discover(source: &Document, docs: &[Document]) -> Vec<DiscoveredEdge> {
    let source_sig = extract(&source.content);
    if source_sig.is_empty() {
        return Vec::new();
    }

    let mut edges = Vec::new();
    for doc in docs {
        if doc.id == source.id {
            continue;
        }
        let target_sig = extract(&doc.content);
        if target_sig.is_empty() {
            continue;
        }

        let concept_overlap = jaccard(&source_sig.concepts, &target_sig.concepts);
        let term_similarity = cosine(&source_sig.terms, &target_sig.terms);
        let score = 0.5 * concept_overlap + 0.5 * term_similarity;
        let context = shared_concepts(&source_sig, &target_sig).join(", ");

        if concept_overlap >= MENTION_OVERLAP_FLOOR {
            edges.push(DiscoveredEdge {
                source_id: source.id.clone(),
                target_id: doc.id.clone(),
                kind: EdgeKind::Mentions,
                confidence: Confidence::new(MENTIONS_CONFIDENCE),
                reasoning: format!("concept overlap {concept_overlap:.3} above mention floor"),
                context: context.clone(),
                line_number: None,
            });
        }

        if score > SIMILARITY_FLOOR {
            edges.push(DiscoveredEdge {
                source_id: source.id.clone(),
                target_id: doc.id.clone(),
                kind: EdgeKind::SimilarTo,
                confidence: Confidence::new(SIMILARITY_BASE + SIMILARITY_SCALE * score),
                reasoning: format!(
                    "combined score {score:.3} (jaccard {concept_overlap:.3}, cosine {term_similarity:.3})"
                ),
                context,
                line_number: None,
            });
        }
    }
    edges
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> Document {
        Document::new(id, content)
    }

    #[test]
    fn near_identical_content_emits_both_bands() {
        let source = doc("a.md", "causal trace engine with crystallization summaries");
        let docs = vec![doc("b.md", "causal trace engine with crystallization output")];

        let edges = discover(&source, &docs);
        let kinds: Vec<_> = edges.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EdgeKind::Mentions));
        assert!(kinds.contains(&EdgeKind::SimilarTo));
    }

    #[test]
    fn similar_to_confidence_scales_with_score() {
        let source = doc("a.md", "alpha beta gamma delta");
        let docs = vec![doc("b.md", "alpha beta gamma delta")];

        let edges = discover(&source, &docs);
        let similar = edges
            .iter()
            .find(|e| e.kind == EdgeKind::SimilarTo)
            .expect("similar_to edge");
        // Identical content: score 1.0, confidence 0.5 + 0.35.
        assert!((similar.confidence.value() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn unrelated_content_emits_nothing() {
        let source = doc("a.md", "quantum chromodynamics lattice");
        let docs = vec![doc("b.md", "sourdough hydration schedule")];

        assert!(discover(&source, &docs).is_empty());
    }

    #[test]
    fn mention_fires_without_similarity() {
        // One shared concept out of five, but term frequencies diverge enough
        // to keep the combined score under the similarity floor.
        let source = doc("a.md", "agents compose tasks");
        let docs = vec![doc("b.md", "agents dispatch dispatch dispatch dispatch queue")];

        let edges = discover(&source, &docs);
        assert!(edges.iter().any(|e| e.kind == EdgeKind::Mentions));
        assert!(edges.iter().all(|e| e.kind != EdgeKind::SimilarTo));
    }

    #[test]
    fn empty_source_emits_nothing() {
        let source = doc("a.md", "");
        let docs = vec![doc("b.md", "anything at all")];
        assert!(discover(&source, &docs).is_empty());
    }

    #[test]
    fn two_runs_identical() {
        let source = doc("a.md", "causal trace engine");
        let docs = vec![
            doc("b.md", "causal trace engine"),
            doc("c.md", "trace summaries"),
        ];
        assert_eq!(discover(&source, &docs), discover(&source, &docs));
    }
}
