//! # Structural Layer Strategy
//!
//! Artifacts may declare an abstraction layer (`layer: N`, ordered from
//! abstract to concrete). When a candidate sits exactly one layer below
//! the source — the lineage direction — one fixed kind is emitted at the
//! structural band. Backward and non-adjacent pairs never emit.
//!
//! The kind depends on where in the lineage the step happens:
//! layer 0 grounds layer 1, 1 justifies 2, 2 specifies 3, and deeper
//! steps realize.

use crate::corpus::Document;
use crate::primitives::STRUCTURAL_CONFIDENCE;
use crate::signature::extract;
use crate::{Confidence, DiscoveredEdge, EdgeKind};

/// The fixed kind for a lineage step starting at `source_layer`.
fn lineage_kind(source_layer: i64) -> EdgeKind {
    match source_layer {
        0 => EdgeKind::Grounds,
        1 => EdgeKind::Justifies,
        2 => EdgeKind::Specifies,
        _ => EdgeKind::Realizes,
    }
}

/// Run the structural strategy for one source against drained candidates.
#[must_use]
pub fn discover(source: &Document, docs: &[Document]) -> Vec<DiscoveredEdge> {
    let Some(source_layer) = extract(&source.content).layer else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    for doc in docs {
        if doc.id == source.id {
            continue;
        }
        let Some(target_layer) = extract(&doc.content).layer else {
            continue;
        };
        // Only one step toward the concrete; never backward, never a jump.
        if target_layer != source_layer.saturating_add(1) {
            continue;
        }
        let kind = lineage_kind(source_layer);
        edges.push(DiscoveredEdge {
            source_id: source.id.clone(),
            target_id: doc.id.clone(),
            kind,
            confidence: Confidence::new(STRUCTURAL_CONFIDENCE),
            reasoning: format!(
                "adjacent layers {source_layer} -> {target_layer} in lineage direction"
            ),
            context: format!("layer {source_layer} against layer {target_layer}"),
            line_number: None,
        });
    }
    edges
}

// =============================================================================
// TESTS
// =============================================================================
