//! # Contradiction Strategy
//!
//! Extracts negation patterns from the source ("not X", "cannot X",
//! "isn't X") and searches candidates for a positive assertion of the same
//! term. Modal negation scores the top of the band; plain negation the
//! bottom. When the candidate also negates the term, nothing is emitted:
//! both-negate is agreement.
//!
//! The heuristic is known to produce false positives under more complex
//! phrasing; the suppression rule above is the only guard carried here.

use crate::corpus::Document;
use crate::primitives::{CONTRADICTION_CONFIDENCE, CONTRADICTION_MODAL_CONFIDENCE};
use crate::signature::tokenize;
use crate::{Confidence, DiscoveredEdge, EdgeKind};
use std::collections::BTreeMap;

/// One negated term found in a content string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Negation {
    term: String,
    /// "cannot" carries more commitment than "not"/"isn't".
    modal: bool,
}

/// Extract negated terms from tokenized content.
///
/// Patterns over the token stream: `not X`, `cannot X`, `isn t X`
/// (the tokenizer splits "isn't" at the apostrophe).
fn negations(tokens: &[String]) -> Vec<Negation> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (term_at, modal) = match tokens[i].as_str() {
            "cannot" => (i + 1, true),
            "not" => (i + 1, false),
            "isn" if tokens.get(i + 1).map(String::as_str) == Some("t") => (i + 2, false),
            _ => {
                i += 1;
                continue;
            }
        };
        if let Some(term) = tokens.get(term_at) {
            found.push(Negation {
                term: term.clone(),
                modal,
            });
        }
        i = term_at;
    }
    found
}

/// Whether the token stream positively asserts a term: the term occurs at
/// a position that is not itself negated.
fn asserts(tokens: &[String], term: &str) -> bool {
    tokens.iter().enumerate().any(|(i, token)| {
        if token != term {
            return false;
        }
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p)).map(String::as_str);
        let prev2 = i.checked_sub(2).and_then(|p| tokens.get(p)).map(String::as_str);
        let negated = matches!(prev, Some("not" | "cannot"))
            || (prev == Some("t") && prev2 == Some("isn"));
        !negated
    })
}

/// First line of a document containing a term, with its 1-based number.
fn evidence_line<'a>(content: &'a str, term: &str) -> Option<(u32, &'a str)> {
    content
        .lines()
        .enumerate()
        .find(|(_, line)| tokenize(line).iter().any(|t| t == term))
        .map(|(i, line)| (i as u32 + 1, line.trim()))
}

/// Run the contradiction strategy for one source against drained candidates.
#[must_use]
pub fn discover(source: &Document, docs: &[Document]) -> Vec<DiscoveredEdge> {
    let source_tokens = tokenize(&source.content);
    let source_negations = negations(&source_tokens);
    if source_negations.is_empty() {
        return Vec::new();
    }

    // Strongest negation per term; order stays deterministic via BTreeMap.
    let mut by_term: BTreeMap<String, bool> = BTreeMap::new();
    for negation in source_negations {
        let modal = by_term.entry(negation.term).or_insert(false);
        *modal = *modal || negation.modal;
    }

    let mut edges = Vec::new();
    for doc in docs {
        if doc.id == source.id {
            continue;
        }
        let target_tokens = tokenize(&doc.content);
        let target_negated: Vec<String> = negations(&target_tokens)
            .into_iter()
            .map(|n| n.term)
            .collect();

        for (term, modal) in &by_term {
            // Both-negate is agreement, not contradiction.
            if target_negated.contains(term) {
                continue;
            }
            if !asserts(&target_tokens, term) {
                continue;
            }
            let confidence = if *modal {
                CONTRADICTION_MODAL_CONFIDENCE
            } else {
                CONTRADICTION_CONFIDENCE
            };
            let (line_number, context) = evidence_line(&doc.content, term)
                .map_or((None, String::new()), |(n, line)| {
                    (Some(n), line.to_string())
                });
            edges.push(DiscoveredEdge {
                source_id: source.id.clone(),
                target_id: doc.id.clone(),
                kind: EdgeKind::Contradicts,
                confidence: Confidence::new(confidence),
                reasoning: format!("source negates '{term}', candidate asserts it"),
                context,
                line_number,
            });
        }
    }
    edges
}

// =============================================================================
// TESTS
// =============================================================================
