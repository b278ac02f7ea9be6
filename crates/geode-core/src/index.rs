//! # Causal Index
//!
//! Derived, rebuildable index over a trace enabling ancestor, descendant,
//! and subtree queries in sub-linear time.
//!
//! The index is purely a cache: every query answer is reconstructible from
//! the store, and `rebuild_from` proves it. Appends attach a child pointer
//! in O(1) amortized; subtree sizes are batched behind a dirty flag rather
//! than propagated up the ancestor chain on every append.

use crate::{GeodeError, Mark, MarkId, MarkKind, TraceStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// NODE ANNOTATION
// =============================================================================

/// Compact kind tag carried by index nodes.
///
/// The full `MarkKind` payload (ghost reasons, sibling back-references)
/// stays in the store; the index only needs the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Chosen,
    Ghost,
    Derived,
}

impl From<&MarkKind> for NodeKind {
    fn from(kind: &MarkKind) -> Self {
        match kind {
            MarkKind::Chosen => NodeKind::Chosen,
            MarkKind::Ghost { .. } => NodeKind::Ghost,
            MarkKind::Derived => NodeKind::Derived,
        }
    }
}

/// One node of a materialized causal subtree.
///
/// Children are ordered by id. Ghost siblings at a branching point appear
/// beside their chosen sibling, tagged as ghosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: MarkId,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total nodes in this subtree, self included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

// =============================================================================
// INDEX ENTRY
// =============================================================================

#[derive(Debug, Clone, Default)]
struct IndexEntry {
    children: BTreeSet<MarkId>,
    parents: Vec<MarkId>,
    depth: u32,
    kind: Option<NodeKind>,
}

// =============================================================================
// CAUSAL INDEX
// =============================================================================

/// Derived mapping `id -> {children, depth, subtree_size}`.
///
/// `record_append` is the only mutation driven by the write path; size
/// queries flush a pending batch first. Queries against Marks the index
/// has not seen return `None`/empty rather than failing.
#[derive(Debug, Clone, Default)]
pub struct CausalIndex {
    entries: BTreeMap<MarkId, IndexEntry>,

    /// Memoized subtree sizes, valid only while `dirty` is false.
    sizes: BTreeMap<MarkId, u64>,

    /// Appends have landed since the last size flush.
    dirty: bool,
}

impl CausalIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the whole index from a store.
    ///
    /// The replacement is built off to the side and returned whole, so a
    /// caller can swap it in atomically; readers never observe a
    /// partially-built index.
    pub fn rebuild_from<S: TraceStore>(store: &S) -> Result<Self, GeodeError> {
        let mut index = Self::new();
        for mark in store.all_marks()? {
            index.record_append(&mark);
        }
        Ok(index)
    }

    /// Record one appended Mark: attach child pointers and compute depth.
    ///
    /// Cost is O(parent count), independent of trace depth. Subtree sizes
    /// are not touched here; they are recomputed in a batch on the next
    /// size query.
    pub fn record_append(&mut self, mark: &Mark) {
        let depth = mark
            .parent_ids
            .iter()
            .filter_map(|p| self.entries.get(p).map(|e| e.depth))
            .max()
            .map_or(0, |d| d.saturating_add(1));

        for parent in &mark.parent_ids {
            self.entries.entry(*parent).or_default().children.insert(mark.id);
        }

        let entry = self.entries.entry(mark.id).or_default();
        entry.parents = mark.parent_ids.clone();
        entry.depth = depth;
        entry.kind = Some(NodeKind::from(&mark.kind));

        self.dirty = true;
    }

    /// Whether the index has seen this Mark.
    #[must_use]
    pub fn contains(&self, id: MarkId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.kind.is_some())
    }

    /// Direct children of a Mark, ascending.
    #[must_use]
    pub fn children(&self, id: MarkId) -> Vec<MarkId> {
        self.entries
            .get(&id)
            .map(|e| e.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Depth of a Mark: 0 for roots, 1 + max parent depth otherwise.
    #[must_use]
    pub fn depth(&self, id: MarkId) -> Option<u32> {
        self.entries.get(&id).filter(|e| e.kind.is_some()).map(|e| e.depth)
    }

    /// Number of indexed Marks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.kind.is_some()).count()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // ANCESTRY
    // =========================================================================

    /// All ancestors of a Mark plus the Mark itself, root-first.
    ///
    /// Deduplicated across merge points. Ascending id order is returned,
    /// which is a valid topological order because every parent id is
    /// smaller than its child's.
    #[must_use]
    pub fn ancestor_ids(&self, id: MarkId) -> Vec<MarkId> {
        if !self.contains(id) {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id);
        seen.insert(id);

        while let Some(current) = queue.pop_front() {
            if let Some(entry) = self.entries.get(&current) {
                for parent in &entry.parents {
                    if seen.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }

        seen.into_iter().collect()
    }

    // =========================================================================
    // SUBTREE
    // =========================================================================

    /// Materialize the causal tree rooted at a Mark.
    ///
    /// Every ghost sibling at each branching point is included, tagged by
    /// kind. A Mark reachable through more than one merge path appears
    /// once per path; cycles cannot occur in an append-only log.
    #[must_use]
    pub fn subtree(&self, id: MarkId) -> Option<TreeNode> {
        let entry = self.entries.get(&id)?;
        let kind = entry.kind?;
        let children = entry
            .children
            .iter()
            .filter_map(|child| self.subtree(*child))
            .collect();
        Some(TreeNode { id, kind, children })
    }

    /// Distinct Marks reachable from `id` through child pointers, self
    /// included.
    ///
    /// Lazily batched: the memo table is dropped once per append burst and
    /// rebuilt per queried root, so appends stay O(1) and a burst of size
    /// queries pays the traversal once.
    pub fn subtree_size(&mut self, id: MarkId) -> Option<u64> {
        if !self.contains(id) {
            return None;
        }
        if self.dirty {
            self.sizes.clear();
            self.dirty = false;
        }
        if let Some(size) = self.sizes.get(&id) {
            return Some(*size);
        }

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id);
        seen.insert(id);
        while let Some(current) = queue.pop_front() {
            if let Some(entry) = self.entries.get(&current) {
                for child in &entry.children {
                    if seen.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }

        let size = seen.len() as u64;
        self.sizes.insert(id, size);
        Some(size)
    }
}

// =============================================================================
// TESTS
// =============================================================================
