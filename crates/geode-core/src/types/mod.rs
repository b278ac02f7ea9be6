//! # Core Type Definitions
//!
//! This module contains all core types for the Geode causal trace substrate:
//! - Trace and mark identifiers (`TraceId`, `MarkId`, `CrystalId`)
//! - The witnessed Mark record and its kind discriminant (`Mark`, `MarkKind`)
//! - Discovery output (`EdgeKind`, `DiscoveredEdge`, `ConceptSignature`)
//! - Crystallization output (`Crystal`, `Law`)
//! - Error types (`GeodeError`)
//!
//! ## Immutability Guarantees
//!
//! A `Mark` is immutable after append: no field is ever rewritten and no
//! Mark is ever deleted. Rejected alternatives are recorded as first-class
//! ghost siblings, not discarded. All collection types are BTree-based for
//! deterministic ordering.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a Mark within a trace.
///
/// Ids are allocated sequentially at append time, so a parent's id is
/// always smaller than its children's. Ascending id order is therefore a
/// valid topological order over the causal graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkId(pub u64);

/// Unique identifier for a Crystal within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrystalId(pub u64);

/// Identifier for one causal trace (one lineage, one append-only log).
///
/// The trace id is an explicit parameter threaded through every call;
/// there is no process-wide "current trace".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId(pub String);

impl TraceId {
    /// Create a new trace id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the trace id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// CONFIDENCE
// =============================================================================

/// Confidence attached to a Mark or a discovered edge.
///
/// Always inside [0, 1]; construction clamps out-of-range and non-finite
/// input rather than propagating it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Create a confidence value, clamped into [0, 1].
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self(0.0)
        }
    }

    /// Zero confidence.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Whether this confidence clears the peak threshold (strict).
    #[must_use]
    pub fn is_peak(self) -> bool {
        self.0 > crate::primitives::PEAK_THRESHOLD
    }
}

// =============================================================================
// MARK
// =============================================================================

/// The kind discriminant of a Mark.
///
/// Ghosts are recorded-but-unchosen siblings at a decision point. They are
/// an annotation on an ordinary causal node, not a parallel hierarchy:
/// the variant carries the rejection reason and a back-reference to the
/// chosen sibling at the same decision point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkKind {
    /// The decision that was taken.
    Chosen,
    /// A rejected alternative, retained as a first-class sibling.
    Ghost {
        /// Why this alternative was not taken.
        unchosen_reason: String,
        /// The sibling that was taken instead.
        chosen_sibling: MarkId,
    },
    /// Machine-produced follow-on (crystals persist as derived Marks).
    Derived,
}

impl MarkKind {
    /// Short tag name for display and tree annotation.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            MarkKind::Chosen => "chosen",
            MarkKind::Ghost { .. } => "ghost",
            MarkKind::Derived => "derived",
        }
    }
}

/// An atomic, immutable witnessed event in a causal log.
///
/// `parent_ids` is empty for a root, and holds more than one id at a merge
/// point. Parents always exist at append time; the store enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// Sequentially allocated identifier.
    pub id: MarkId,
    /// Unix epoch milliseconds at append time.
    pub created_at: u64,
    /// Who witnessed this decision.
    pub author: String,
    /// The decision content.
    pub content: String,
    /// Causal parents, deduplicated, in submission order.
    pub parent_ids: Vec<MarkId>,
    /// Chosen, ghost, or derived.
    pub kind: MarkKind,
    /// Confidence in [0, 1].
    pub confidence: Confidence,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
}

impl Mark {
    /// Whether this Mark is a root (no parents).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// Whether this Mark is a ghost sibling.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        matches!(self.kind, MarkKind::Ghost { .. })
    }

    /// Whether this Mark clears the peak threshold.
    #[must_use]
    pub fn is_peak(&self) -> bool {
        self.confidence.is_peak()
    }
}

/// Input to `append`: everything the caller decides, nothing the store does.
///
/// The store allocates the id and stamps the timestamp; the draft carries
/// the rest. Constructors cover the three kinds.
#[derive(Debug, Clone)]
pub struct MarkDraft {
    pub author: String,
    pub content: String,
    pub parent_ids: Vec<MarkId>,
    pub kind: MarkKind,
    pub confidence: Confidence,
    pub tags: BTreeSet<String>,
}

impl MarkDraft {
    /// Draft a chosen decision.
    #[must_use]
    pub fn chosen(
        author: impl Into<String>,
        content: impl Into<String>,
        parent_ids: Vec<MarkId>,
        confidence: f64,
    ) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            parent_ids,
            kind: MarkKind::Chosen,
            confidence: Confidence::new(confidence),
            tags: BTreeSet::new(),
        }
    }

    /// Draft a ghost sibling of an already-appended chosen Mark.
    #[must_use]
    pub fn ghost(
        author: impl Into<String>,
        content: impl Into<String>,
        parent_ids: Vec<MarkId>,
        unchosen_reason: impl Into<String>,
        chosen_sibling: MarkId,
    ) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            parent_ids,
            kind: MarkKind::Ghost {
                unchosen_reason: unchosen_reason.into(),
                chosen_sibling,
            },
            confidence: Confidence::zero(),
            tags: BTreeSet::new(),
        }
    }

    /// Draft a derived Mark.
    #[must_use]
    pub fn derived(
        author: impl Into<String>,
        content: impl Into<String>,
        parent_ids: Vec<MarkId>,
        confidence: f64,
    ) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            parent_ids,
            kind: MarkKind::Derived,
            confidence: Confidence::new(confidence),
            tags: BTreeSet::new(),
        }
    }

    /// Attach tags to the draft.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Override the confidence on the draft.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Confidence::new(confidence);
        self
    }
}

// =============================================================================
// DISCOVERED EDGES
// =============================================================================

/// Typed relationship kinds a discovery strategy may infer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    DerivesFrom,
    Implements,
    Tests,
    References,
    Extends,
    Mentions,
    SimilarTo,
    Grounds,
    Justifies,
    Specifies,
    Realizes,
    ReflectsOn,
    Represents,
    Contradicts,
}

impl EdgeKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::DerivesFrom => "derives_from",
            EdgeKind::Implements => "implements",
            EdgeKind::Tests => "tests",
            EdgeKind::References => "references",
            EdgeKind::Extends => "extends",
            EdgeKind::Mentions => "mentions",
            EdgeKind::SimilarTo => "similar_to",
            EdgeKind::Grounds => "grounds",
            EdgeKind::Justifies => "justifies",
            EdgeKind::Specifies => "specifies",
            EdgeKind::Realizes => "realizes",
            EdgeKind::ReflectsOn => "reflects_on",
            EdgeKind::Represents => "represents",
            EdgeKind::Contradicts => "contradicts",
        }
    }
}

/// A typed, confidence-scored inferred relationship between two artifacts.
///
/// Immutable once emitted. Discovery is idempotent: re-running never
/// deletes prior results; callers wanting "the best edge" per pair select
/// max-confidence themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEdge {
    /// Artifact the evidence was found in.
    pub source_id: String,
    /// Artifact the evidence points at.
    pub target_id: String,
    /// Relationship kind.
    pub kind: EdgeKind,
    /// Fixed strategy band, in [0, 1].
    pub confidence: Confidence,
    /// Why the strategy emitted this edge.
    pub reasoning: String,
    /// The content fragment the edge was read from.
    pub context: String,
    /// 1-based line of the evidence, where line-addressable.
    pub line_number: Option<u32>,
}

// =============================================================================
// CONCEPT SIGNATURE
// =============================================================================

/// Pure derived value summarizing one artifact's content.
///
/// `terms` is a multiset (term -> count); `concepts` the distinct
/// significant tokens; `layer` an optional declared abstraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConceptSignature {
    pub concepts: BTreeSet<String>,
    pub terms: BTreeMap<String, u32>,
    pub layer: Option<i64>,
}

impl ConceptSignature {
    /// Whether the signature carries no information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.terms.is_empty()
    }
}

// =============================================================================
// CRYSTAL
// =============================================================================

/// A bounded-size, law-validated lossy summary of a trace range.
///
/// Invariants: `compression_ratio <= 0.10`, and every peak in the source
/// range is either referenced by `selected_marks` or named as an
/// acknowledged gap inside `summary_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    pub id: CrystalId,
    /// Inclusive `[first_id, last_id]` of the summarized range.
    pub source_range: (MarkId, MarkId),
    /// Ordered Marks the summary is built from.
    pub selected_marks: Vec<MarkId>,
    pub summary_text: String,
    /// `summary bytes / full range content bytes`.
    pub compression_ratio: f64,
    /// Peaks the crystal preserves by reference.
    pub preserved_peaks: BTreeSet<MarkId>,
    pub created_at: u64,
}

/// Everything the crystallization engine decides about a Crystal.
///
/// The store allocates the id and stamps the timestamp when the crystal is
/// persisted, in the same atomic step that appends its derived Mark.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalSeed {
    pub source_range: (MarkId, MarkId),
    pub selected_marks: Vec<MarkId>,
    pub summary_text: String,
    pub compression_ratio: f64,
    pub preserved_peaks: BTreeSet<MarkId>,
}

// =============================================================================
// PRESERVATION LAWS
// =============================================================================

/// The qualitative laws a Crystal must satisfy before acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Law {
    /// >= 80% of peaks selected or explicitly acknowledged.
    DelightPreservation,
    /// Summary contains at least one term from the warmth lexicon.
    WarmthRequirement,
    /// Low-novelty ranges must carry an explicit notice.
    SterilityAlert,
}

impl Law {
    /// Stable law name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Law::DelightPreservation => "DelightPreservation",
            Law::WarmthRequirement => "WarmthRequirement",
            Law::SterilityAlert => "SterilityAlert",
        }
    }
}

impl std::fmt::Display for Law {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Geode system.
///
/// - Fatal errors (`ParentNotFound`, `CycleDetected`) abort a single
///   operation and leave the store untouched.
/// - Soft failures (`BudgetExceeded`, `OracleUnavailable`, `LawViolation`)
///   never corrupt state and carry enough structure to retry or abandon.
#[derive(Debug, Error)]
pub enum GeodeError {
    /// A supplied parent id does not exist at append time.
    #[error("Parent not found: {0:?}")]
    ParentNotFound(MarkId),

    /// A parent id is not older than the Mark being appended.
    /// Defensive check against id-reuse bugs in callers.
    #[error("Cycle detected through {0:?}")]
    CycleDetected(MarkId),

    /// The draft failed validation before touching the store.
    #[error("Invalid mark: {0}")]
    InvalidMark(String),

    /// The requested Mark is absent from this trace.
    #[error("Mark not found: {0:?}")]
    MarkNotFound(MarkId),

    /// The requested Crystal is absent from this trace.
    #[error("Crystal not found: {0:?}")]
    CrystalNotFound(CrystalId),

    /// The summary could not fit the ratio budget without dropping peaks.
    #[error("Compression budget exceeded: ratio {ratio:.4} > budget {budget:.2}")]
    BudgetExceeded { ratio: f64, budget: f64 },

    /// The distance oracle failed or timed out; crystallization fails closed.
    #[error("Distance oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// A preservation law failed validation.
    #[error("Law violated: {law}")]
    LawViolation { law: Law },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
