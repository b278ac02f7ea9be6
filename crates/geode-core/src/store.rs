//! # Causal Store
//!
//! The append-only Mark log for one trace.
//!
//! This module implements the `TraceStore` trait. `append_mark` is the only
//! mutating operation; Marks are never rewritten or deleted. Ids are
//! allocated sequentially, which makes ascending id order a valid
//! topological order and gives readers causal consistency for free: every
//! ancestor of an observed Mark has a smaller id.

use crate::primitives::{
    MAX_AUTHOR_LENGTH, MAX_CONTENT_LENGTH, MAX_PARENTS, MAX_REASON_LENGTH, MAX_TAGS,
    MAX_TAG_LENGTH,
};
use crate::{Crystal, CrystalId, CrystalSeed, GeodeError, Mark, MarkDraft, MarkId, MarkKind};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix epoch milliseconds, 0 if the clock is before the epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A pinned view of one trace: the number of Marks appended so far.
///
/// Incremented on each successful append. A reader holding a snapshot sees
/// exactly the Marks with `id < snapshot`, which is causally consistent
/// because parents always precede children in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot(pub u64);

impl Snapshot {
    /// Whether a Mark is visible under this snapshot.
    #[must_use]
    pub fn sees(&self, id: MarkId) -> bool {
        id.0 < self.0
    }
}

// =============================================================================
// DRAFT VALIDATION
// =============================================================================

/// Validate a draft before it touches the store.
///
/// Bounds follow the compiled limits in `primitives`; a rejected draft
/// leaves the store untouched.
pub fn validate(draft: &MarkDraft) -> Result<(), GeodeError> {
    if draft.author.is_empty() {
        return Err(GeodeError::InvalidMark("empty author".to_string()));
    }
    if draft.author.len() > MAX_AUTHOR_LENGTH {
        return Err(GeodeError::InvalidMark("author too long".to_string()));
    }
    if draft.content.len() > MAX_CONTENT_LENGTH {
        return Err(GeodeError::InvalidMark("content too long".to_string()));
    }
    if draft.parent_ids.len() > MAX_PARENTS {
        return Err(GeodeError::InvalidMark("too many parents".to_string()));
    }
    if draft.tags.len() > MAX_TAGS {
        return Err(GeodeError::InvalidMark("too many tags".to_string()));
    }
    if draft.tags.iter().any(|t| t.is_empty() || t.len() > MAX_TAG_LENGTH) {
        return Err(GeodeError::InvalidMark("invalid tag".to_string()));
    }
    if let MarkKind::Ghost { unchosen_reason, .. } = &draft.kind {
        if unchosen_reason.is_empty() {
            return Err(GeodeError::InvalidMark("empty unchosen reason".to_string()));
        }
        if unchosen_reason.len() > MAX_REASON_LENGTH {
            return Err(GeodeError::InvalidMark("unchosen reason too long".to_string()));
        }
    }
    Ok(())
}

/// Deduplicate parent ids preserving submission order.
pub(crate) fn dedupe_parents(parent_ids: &[MarkId]) -> Vec<MarkId> {
    let mut seen = std::collections::BTreeSet::new();
    parent_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .copied()
        .collect()
}

/// Shared append checks for all backends: parents exist and precede the id
/// about to be allocated; ghost back-references are coherent. `lookup`
/// resolves an id to that Mark's parent list.
pub(crate) fn check_links<F>(
    draft: &MarkDraft,
    next_id: u64,
    lookup: F,
) -> Result<Vec<MarkId>, GeodeError>
where
    F: Fn(MarkId) -> Result<Option<Vec<MarkId>>, GeodeError>,
{
    let parents = dedupe_parents(&draft.parent_ids);
    for parent in &parents {
        if parent.0 >= next_id {
            return Err(GeodeError::CycleDetected(*parent));
        }
        if lookup(*parent)?.is_none() {
            return Err(GeodeError::ParentNotFound(*parent));
        }
    }
    if let MarkKind::Ghost { chosen_sibling, .. } = &draft.kind {
        let Some(sibling_parents) = lookup(*chosen_sibling)? else {
            return Err(GeodeError::InvalidMark(format!(
                "chosen sibling {:?} not found",
                chosen_sibling
            )));
        };
        // A ghost and its chosen sibling sit at the same decision point.
        let shares_parent = if parents.is_empty() {
            sibling_parents.is_empty()
        } else {
            sibling_parents.iter().any(|p| parents.contains(p))
        };
        if !shares_parent {
            return Err(GeodeError::InvalidMark(
                "ghost and chosen sibling have no common parent".to_string(),
            ));
        }
    }
    Ok(parents)
}

/// Stamp a validated draft into an immutable Mark.
pub(crate) fn seal(draft: MarkDraft, id: MarkId, parents: Vec<MarkId>) -> Mark {
    Mark {
        id,
        created_at: now_millis(),
        author: draft.author,
        content: draft.content,
        parent_ids: parents,
        kind: draft.kind,
        confidence: draft.confidence,
        tags: draft.tags,
    }
}

// =============================================================================
// TRACESTORE TRAIT
// =============================================================================

/// The TraceStore trait defines the append-only log operations.
///
/// All fallible operations return `Result<T, GeodeError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait TraceStore {
    /// Append a Mark. Fails with `ParentNotFound` if any parent is absent
    /// and `CycleDetected` if a parent id would not precede the new id.
    /// All-or-nothing: a failed append leaves the store untouched.
    fn append_mark(&mut self, draft: MarkDraft) -> Result<Mark, GeodeError>;

    /// Lookup a Mark by id. Returns owned Mark for storage compatibility.
    fn get(&self, id: MarkId) -> Result<Option<Mark>, GeodeError>;

    /// Check if a Mark exists.
    fn contains(&self, id: MarkId) -> Result<bool, GeodeError>;

    /// Total number of Marks.
    fn mark_count(&self) -> Result<usize, GeodeError>;

    /// The current snapshot counter.
    fn snapshot(&self) -> Result<Snapshot, GeodeError>;

    /// All Marks with `start <= id <= end`, ascending.
    fn marks_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Mark>, GeodeError>;

    /// Every Mark in append order (index rebuilds, export).
    fn all_marks(&self) -> Result<Vec<Mark>, GeodeError>;

    /// Persist a Crystal and its derived Mark as one atomic append.
    /// Nothing partial is ever visible: either both land or neither does.
    fn append_crystal(
        &mut self,
        seed: CrystalSeed,
        mark: MarkDraft,
    ) -> Result<(Crystal, Mark), GeodeError>;

    /// Lookup a Crystal by id.
    fn get_crystal(&self, id: CrystalId) -> Result<Option<Crystal>, GeodeError>;

    /// Crystals whose source range lies inside `[start, end]`, ascending.
    fn crystals_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Crystal>, GeodeError>;
}

// =============================================================================
// IN-MEMORY TRACE
// =============================================================================

/// The in-memory append-only trace.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    /// Mark storage: MarkId -> Mark, ascending id order is append order.
    marks: BTreeMap<MarkId, Mark>,

    /// Crystal storage: CrystalId -> Crystal.
    crystals: BTreeMap<CrystalId, Crystal>,

    /// Next Mark id to allocate; doubles as the snapshot counter.
    next_mark_id: u64,

    /// Next Crystal id to allocate.
    next_crystal_id: u64,
}

impl MemoryTrace {
    /// Create a new empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a trace from Marks in append order, preserving ids.
    ///
    /// Used by the persistence layer on reload; the Marks are trusted to
    /// have been validated when first appended.
    #[must_use]
    pub fn from_marks(marks: Vec<Mark>) -> Self {
        let mut next_mark_id = 0;
        let mut map = BTreeMap::new();
        for mark in marks {
            if mark.id.0 >= next_mark_id {
                next_mark_id = mark.id.0.saturating_add(1);
            }
            map.insert(mark.id, mark);
        }
        Self {
            marks: map,
            crystals: BTreeMap::new(),
            next_mark_id,
            next_crystal_id: 0,
        }
    }

    /// Iterate Marks in id (= append) order.
    pub fn marks(&self) -> impl Iterator<Item = &Mark> {
        self.marks.values()
    }
}

impl TraceStore for MemoryTrace {
    fn append_mark(&mut self, draft: MarkDraft) -> Result<Mark, GeodeError> {
        validate(&draft)?;
        let parents = check_links(&draft, self.next_mark_id, |id| {
            Ok(self.marks.get(&id).map(|m| m.parent_ids.clone()))
        })?;

        let id = MarkId(self.next_mark_id);
        self.next_mark_id = self.next_mark_id.saturating_add(1);

        let mark = seal(draft, id, parents);
        self.marks.insert(id, mark.clone());
        Ok(mark)
    }

    fn get(&self, id: MarkId) -> Result<Option<Mark>, GeodeError> {
        Ok(self.marks.get(&id).cloned())
    }

    fn contains(&self, id: MarkId) -> Result<bool, GeodeError> {
        Ok(self.marks.contains_key(&id))
    }

    fn mark_count(&self) -> Result<usize, GeodeError> {
        Ok(self.marks.len())
    }

    fn snapshot(&self) -> Result<Snapshot, GeodeError> {
        Ok(Snapshot(self.next_mark_id))
    }

    fn marks_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Mark>, GeodeError> {
        Ok(self.marks.range(start..=end).map(|(_, m)| m.clone()).collect())
    }

    fn all_marks(&self) -> Result<Vec<Mark>, GeodeError> {
        Ok(self.marks.values().cloned().collect())
    }

    fn append_crystal(
        &mut self,
        seed: CrystalSeed,
        mark: MarkDraft,
    ) -> Result<(Crystal, Mark), GeodeError> {
        // Run every fallible check before mutating anything.
        validate(&mark)?;
        let parents = check_links(&mark, self.next_mark_id, |id| {
            Ok(self.marks.get(&id).map(|m| m.parent_ids.clone()))
        })?;

        let mark_id = MarkId(self.next_mark_id);
        self.next_mark_id = self.next_mark_id.saturating_add(1);
        let sealed = seal(mark, mark_id, parents);
        self.marks.insert(mark_id, sealed.clone());

        let crystal_id = CrystalId(self.next_crystal_id);
        self.next_crystal_id = self.next_crystal_id.saturating_add(1);
        let crystal = Crystal {
            id: crystal_id,
            source_range: seed.source_range,
            selected_marks: seed.selected_marks,
            summary_text: seed.summary_text,
            compression_ratio: seed.compression_ratio,
            preserved_peaks: seed.preserved_peaks,
            created_at: sealed.created_at,
        };
        self.crystals.insert(crystal_id, crystal.clone());
        Ok((crystal, sealed))
    }

    fn get_crystal(&self, id: CrystalId) -> Result<Option<Crystal>, GeodeError> {
        Ok(self.crystals.get(&id).cloned())
    }

    fn crystals_in_range(&self, start: MarkId, end: MarkId) -> Result<Vec<Crystal>, GeodeError> {
        Ok(self
            .crystals
            .values()
            .filter(|c| c.source_range.0 >= start && c.source_range.1 <= end)
            .cloned()
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn root(trace: &mut MemoryTrace) -> Mark {
        trace
            .append_mark(MarkDraft::chosen("ada", "declare goal", vec![], 0.9))
            .expect("append root")
    }

    #[test]
    fn append_root_mark() {
        let mut trace = MemoryTrace::new();
        let mark = root(&mut trace);

        assert_eq!(mark.id, MarkId(0));
        assert!(mark.is_root());
        assert_eq!(trace.mark_count().expect("count"), 1);
    }

    #[test]
    fn append_allocates_sequential_ids() {
        let mut trace = MemoryTrace::new();
        let a = root(&mut trace);
        let b = trace
            .append_mark(MarkDraft::chosen("ada", "next", vec![a.id], 0.5))
            .expect("append");

        assert_eq!(a.id, MarkId(0));
        assert_eq!(b.id, MarkId(1));
    }

    #[test]
    fn append_missing_parent_fails() {
        let mut trace = MemoryTrace::new();
        root(&mut trace);

        let result = trace.append_mark(MarkDraft::chosen("ada", "bad", vec![MarkId(7)], 0.5));
        // Id 7 was never allocated, so the defensive cycle check fires first.
        assert!(matches!(result, Err(GeodeError::CycleDetected(MarkId(7)))));
    }

    #[test]
    fn append_unallocated_but_smaller_parent_fails_as_not_found() {
        let mut trace = MemoryTrace::from_marks(vec![Mark {
            id: MarkId(5),
            created_at: 0,
            author: "ada".to_string(),
            content: "sparse".to_string(),
            parent_ids: vec![],
            kind: MarkKind::Chosen,
            confidence: crate::Confidence::new(0.5),
            tags: BTreeSet::new(),
        }]);

        let result = trace.append_mark(MarkDraft::chosen("ada", "bad", vec![MarkId(2)], 0.5));
        assert!(matches!(result, Err(GeodeError::ParentNotFound(MarkId(2)))));
    }

    #[test]
    fn failed_append_leaves_store_untouched() {
        let mut trace = MemoryTrace::new();
        root(&mut trace);
        let before = trace.snapshot().expect("snapshot");

        let _ = trace.append_mark(MarkDraft::chosen("ada", "bad", vec![MarkId(9)], 0.5));

        assert_eq!(trace.snapshot().expect("snapshot"), before);
        assert_eq!(trace.mark_count().expect("count"), 1);
    }

    #[test]
    fn ghost_requires_shared_decision_point() {
        let mut trace = MemoryTrace::new();
        let r = root(&mut trace);
        let chosen = trace
            .append_mark(MarkDraft::chosen("ada", "plan x", vec![r.id], 0.8))
            .expect("append");
        let other = trace
            .append_mark(MarkDraft::chosen("ada", "elsewhere", vec![chosen.id], 0.8))
            .expect("append");

        // Ghost under root naming the chosen sibling under root: fine.
        let ok = trace.append_mark(MarkDraft::ghost(
            "ada",
            "plan y",
            vec![r.id],
            "too slow",
            chosen.id,
        ));
        assert!(ok.is_ok());

        // Ghost under root naming a sibling from a different decision point: rejected.
        let bad = trace.append_mark(MarkDraft::ghost(
            "ada",
            "plan z",
            vec![r.id],
            "too slow",
            other.id,
        ));
        assert!(matches!(bad, Err(GeodeError::InvalidMark(_))));
    }

    #[test]
    fn parents_deduplicated_in_order() {
        let mut trace = MemoryTrace::new();
        let a = root(&mut trace);
        let b = trace
            .append_mark(MarkDraft::chosen("ada", "b", vec![a.id], 0.5))
            .expect("append");

        let merge = trace
            .append_mark(MarkDraft::chosen(
                "ada",
                "merge",
                vec![b.id, a.id, b.id],
                0.5,
            ))
            .expect("append");
        assert_eq!(merge.parent_ids, vec![b.id, a.id]);
    }

    #[test]
    fn snapshot_increments_per_append() {
        let mut trace = MemoryTrace::new();
        assert_eq!(trace.snapshot().expect("snapshot"), Snapshot(0));

        let a = root(&mut trace);
        assert_eq!(trace.snapshot().expect("snapshot"), Snapshot(1));
        assert!(trace.snapshot().expect("snapshot").sees(a.id));
        assert!(!trace.snapshot().expect("snapshot").sees(MarkId(1)));
    }

    #[test]
    fn marks_in_range_is_inclusive_and_ordered() {
        let mut trace = MemoryTrace::new();
        let a = root(&mut trace);
        let b = trace
            .append_mark(MarkDraft::chosen("ada", "b", vec![a.id], 0.5))
            .expect("append");
        let c = trace
            .append_mark(MarkDraft::chosen("ada", "c", vec![b.id], 0.5))
            .expect("append");

        let range = trace.marks_in_range(a.id, c.id).expect("range");
        let ids: Vec<_> = range.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn validate_rejects_oversized_drafts() {
        let draft = MarkDraft::chosen("ada", "x".repeat(MAX_CONTENT_LENGTH + 1), vec![], 0.5);
        assert!(matches!(
            validate(&draft),
            Err(GeodeError::InvalidMark(_))
        ));

        let draft = MarkDraft::chosen("", "content", vec![], 0.5);
        assert!(validate(&draft).is_err());
    }

    #[test]
    fn crystal_append_is_atomic_with_derived_mark() {
        let mut trace = MemoryTrace::new();
        let a = root(&mut trace);

        let seed = CrystalSeed {
            source_range: (a.id, a.id),
            selected_marks: vec![a.id],
            summary_text: "summary".to_string(),
            compression_ratio: 0.05,
            preserved_peaks: BTreeSet::from([a.id]),
        };
        let draft = MarkDraft::derived("geode", "summary", vec![a.id], 0.9)
            .with_tags(["crystal".to_string()]);

        let (crystal, mark) = trace.append_crystal(seed, draft).expect("crystal");
        assert_eq!(crystal.id, CrystalId(0));
        assert_eq!(mark.kind, MarkKind::Derived);
        assert_eq!(mark.created_at, crystal.created_at);
        assert_eq!(trace.mark_count().expect("count"), 2);
        assert!(trace
            .get_crystal(crystal.id)
            .expect("get")
            .is_some());
    }

    #[test]
    fn crystals_in_range_filters_by_source_range() {
        let mut trace = MemoryTrace::new();
        let a = root(&mut trace);
        let b = trace
            .append_mark(MarkDraft::chosen("ada", "b", vec![a.id], 0.5))
            .expect("append");

        let seed = CrystalSeed {
            source_range: (a.id, b.id),
            selected_marks: vec![a.id, b.id],
            summary_text: "s".to_string(),
            compression_ratio: 0.01,
            preserved_peaks: BTreeSet::new(),
        };
        let draft = MarkDraft::derived("geode", "s", vec![b.id], 0.9);
        trace.append_crystal(seed, draft).expect("crystal");

        assert_eq!(
            trace.crystals_in_range(a.id, b.id).expect("range").len(),
            1
        );
        assert!(trace
            .crystals_in_range(b.id, b.id)
            .expect("range")
            .is_empty());
    }
}
