//! # Explicit Reference Strategy
//!
//! Scans content for structured references and classifies them by the cue
//! words around them. A markdown link whose cue word names a relationship
//! scores at the classified band; a bare path token with no structure
//! scores at the token band.
//!
//! No regex: the link scanner is a hand-rolled single pass so the strategy
//! stays dependency-free and byte-for-byte deterministic.

use crate::corpus::Document;
use crate::primitives::{EXPLICIT_CLASSIFIED_CONFIDENCE, EXPLICIT_TOKEN_CONFIDENCE};
use crate::{Confidence, DiscoveredEdge, EdgeKind};

/// Cue words recognized immediately before a link, lowercase.
const CUES: &[(&str, EdgeKind)] = &[
    ("implements", EdgeKind::Implements),
    ("implementing", EdgeKind::Implements),
    ("tests", EdgeKind::Tests),
    ("tested", EdgeKind::Tests),
    ("testing", EdgeKind::Tests),
    ("extends", EdgeKind::Extends),
    ("extending", EdgeKind::Extends),
    ("derives", EdgeKind::DerivesFrom),
    ("derived", EdgeKind::DerivesFrom),
    ("references", EdgeKind::References),
    ("referencing", EdgeKind::References),
    ("see", EdgeKind::References),
];

/// How many tokens before a link are searched for a cue word.
const CUE_WINDOW: usize = 3;

/// A markdown link found on one line.
struct Link {
    path: String,
    /// Byte span of the whole `[text](path)` in the line.
    span: (usize, usize),
}

/// Scan one line for `[text](path)` links.
fn parse_links(line: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut search_from = 0;
    while let Some(open) = line[search_from..].find('[').map(|off| search_from + off) {
        let Some(close) = line[open..].find(']').map(|off| open + off) else {
            break;
        };
        if !line[close + 1..].starts_with('(') {
            search_from = close + 1;
            continue;
        }
        let Some(end) = line[close + 2..].find(')').map(|off| close + 2 + off) else {
            break;
        };
        let path = line[close + 2..end].trim();
        if !path.is_empty() {
            links.push(Link {
                path: path.to_string(),
                span: (open, end + 1),
            });
        }
        search_from = end + 1;
    }
    links
}

/// Classify a link by the cue tokens immediately before it.
fn classify(prefix: &str) -> Option<EdgeKind> {
    let tokens = crate::signature::tokenize(prefix);
    tokens
        .iter()
        .rev()
        .take(CUE_WINDOW)
        .find_map(|token| {
            CUES.iter()
                .find(|(cue, _)| cue == &token.as_str())
                .map(|(_, kind)| *kind)
        })
}

/// Whether a path points at a corpus document.
fn resolves_to(path: &str, doc_id: &str) -> bool {
    doc_id == path || doc_id.ends_with(&format!("/{path}"))
}

/// Strip punctuation a path token may be wrapped in.
fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '/' || c == '.' || c == '_' || c == '-'))
}

/// Run the explicit strategy for one source against drained candidates.
#[must_use]
pub fn discover(source: &Document, docs: &[Document]) -> Vec<DiscoveredEdge> {
    let mut edges = Vec::new();

    for (line_idx, line) in source.content.lines().enumerate() {
        let line_number = Some(line_idx as u32 + 1);
        let links = parse_links(line);

        for link in &links {
            let kind = classify(&line[..link.span.0]);
            for doc in docs {
                if doc.id == source.id || !resolves_to(&link.path, &doc.id) {
                    continue;
                }
                let (kind, confidence, reasoning) = match kind {
                    Some(kind) => (
                        kind,
                        EXPLICIT_CLASSIFIED_CONFIDENCE,
                        format!("structured link to {} classified as {}", link.path, kind.as_str()),
                    ),
                    None => (
                        EdgeKind::References,
                        EXPLICIT_TOKEN_CONFIDENCE,
                        format!("structured link to {} with no classifying cue", link.path),
                    ),
                };
                edges.push(DiscoveredEdge {
                    source_id: source.id.clone(),
                    target_id: doc.id.clone(),
                    kind,
                    confidence: Confidence::new(confidence),
                    reasoning,
                    context: line.trim().to_string(),
                    line_number,
                });
            }
        }

        // Mask link spans, then look for bare path tokens in the remainder.
        let mut masked = line.to_string();
        for link in &links {
            masked.replace_range(link.span.0..link.span.1, &" ".repeat(link.span.1 - link.span.0));
        }
        for raw in masked.split_whitespace() {
            let token = trim_token(raw);
            if !token.contains('/') {
                continue;
            }
            for doc in docs {
                if doc.id == source.id || !resolves_to(token, &doc.id) {
                    continue;
                }
                edges.push(DiscoveredEdge {
                    source_id: source.id.clone(),
                    target_id: doc.id.clone(),
                    kind: EdgeKind::References,
                    confidence: Confidence::new(EXPLICIT_TOKEN_CONFIDENCE),
                    reasoning: format!("unstructured reference token {token}"),
                    context: line.trim().to_string(),
                    line_number,
                });
            }
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
    fn classified_link_emits_single_edge() {
        let source = doc("notes.md", "Implements [Spec](spec/x.md)");
        let docs = vec![doc("spec/x.md", "layer: 2\nthe codec spec")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Implements);
        assert_eq!(edges[0].confidence.value(), 0.95);
        assert_eq!(edges[0].target_id, "spec/x.md");
        assert_eq!(edges[0].line_number, Some(1));
    }

    #[test]
    fn uncued_link_falls_back_to_references() {
        let source = doc("notes.md", "Background in [Spec](spec/x.md).");
        let docs = vec![doc("spec/x.md", "spec")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::References);
        assert_eq!(edges[0].confidence.value(), 0.90);
    }

    #[test]
    fn bare_path_token_scores_at_token_band() {
        let source = doc("notes.md", "compare with spec/x.md before deciding");
        let docs = vec![doc("spec/x.md", "spec")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::References);
        assert_eq!(edges[0].confidence.value(), 0.90);
    }

    #[test]
    fn link_span_not_double_counted_as_token() {
        let source = doc("notes.md", "Tests [the codec](spec/x.md)");
        let docs = vec![doc("spec/x.md", "spec")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Tests);
    }

    #[test]
    fn cue_beyond_window_does_not_classify() {
        let source = doc(
            "notes.md",
            "implements something quite unrelated here [Spec](spec/x.md)",
        );
        let docs = vec![doc("spec/x.md", "spec")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::References);
    }

    #[test]
    fn unresolved_path_emits_nothing() {
        let source = doc("notes.md", "Implements [Spec](spec/missing.md)");
        let docs = vec![doc("spec/x.md", "spec")];

        assert!(discover(&source, &docs).is_empty());
    }

    #[test]
    fn self_reference_suppressed() {
        let source = doc("spec/x.md", "see spec/x.md");
        let docs = vec![doc("spec/x.md", "see spec/x.md")];

        assert!(discover(&source, &docs).is_empty());
    }

    #[test]
    fn derives_from_cue_recognized() {
        let source = doc("notes.md", "derives from [axioms](core/axioms.md)");
        let docs = vec![doc("core/axioms.md", "axioms")];

        let edges = discover(&source, &docs);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::DerivesFrom);
    }

    #[test]
    fn two_runs_identical() {
        let source = doc("notes.md", "Implements [Spec](spec/x.md)\nsee core/axioms.md");
        let docs = vec![doc("spec/x.md", "spec"), doc("core/axioms.md", "axioms")];

        assert_eq!(discover(&source, &docs), discover(&source, &docs));
    }
}
