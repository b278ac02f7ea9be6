//! # Session Module
//!
//! The `Trace` handle combines a storage backend with its causal index,
//! and the `TraceRegistry` holds one handle per trace id.
//!
//! Concurrency model: single-writer-per-trace, many-readers. `append` is
//! the only mutating path and takes `&mut self`; the registry wraps each
//! trace in its own mutex, so appends to different traces proceed fully
//! independently. Readers pin a snapshot at query start; the id ordering
//! makes every pinned view causally consistent.
//!
//! ## Storage Backends
//!
//! - `InMemory`: fast, volatile unless exported via `formats`
//! - `Persistent`: disk-backed ACID storage via `RedbTrace`

use crate::config::EngineConfig;
use crate::corpus::{Corpus, Document};
use crate::crystal::{CrystallizationEngine, CrystallizationOutcome};
use crate::discovery::{DiscoveryReport, EdgeDiscoveryEngine};
use crate::index::{CausalIndex, TreeNode};
use crate::oracle::DistanceOracle;
use crate::store::{MemoryTrace, Snapshot};
use crate::storage::RedbTrace;
use crate::{
    Crystal, CrystalId, GeodeError, Mark, MarkDraft, MarkId, TraceId, TraceStore,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage backend for a Trace.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory trace (fast, volatile).
    InMemory(MemoryTrace),
    /// Disk-backed trace using redb (ACID, persistent).
    Persistent(RedbTrace),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryTrace::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbTrace (database handle) cannot be safely cloned.

/// One causal trace: an append-only store plus its derived index.
///
/// The index is maintained incrementally on append and is always
/// rebuildable from the store (`rebuild_index` swaps in a fresh one
/// wholesale, never exposing a half-built index).
#[derive(Debug, Default)]
pub struct Trace {
    backend: StorageBackend,
    index: CausalIndex,
    config: EngineConfig,
}

impl Trace {
    /// Create a new empty in-memory trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory trace with an explicit config.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Open or create a persistent trace at the given path.
    ///
    /// The index is rebuilt from the stored Marks on open.
    pub fn with_redb(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, GeodeError> {
        let store = RedbTrace::open(path)?;
        let index = CausalIndex::rebuild_from(&store)?;
        Ok(Self {
            backend: StorageBackend::Persistent(store),
            index,
            config,
        })
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// The active engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn store(&self) -> &dyn TraceStore {
        match &self.backend {
            StorageBackend::InMemory(t) => t,
            StorageBackend::Persistent(t) => t,
        }
    }

    fn store_mut(&mut self) -> &mut dyn TraceStore {
        match &mut self.backend {
            StorageBackend::InMemory(t) => t,
            StorageBackend::Persistent(t) => t,
        }
    }

    // =========================================================================
    // APPEND (the single mutating path)
    // =========================================================================

    /// Append a Mark and index it.
    pub fn append(&mut self, draft: MarkDraft) -> Result<Mark, GeodeError> {
        let mark = self.store_mut().append_mark(draft)?;
        self.index.record_append(&mark);
        tracing::debug!(
            id = mark.id.0,
            kind = mark.kind.tag(),
            parents = mark.parent_ids.len(),
            "mark appended"
        );
        Ok(mark)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Pin the current snapshot counter.
    pub fn snapshot(&self) -> Result<Snapshot, GeodeError> {
        self.store().snapshot()
    }

    /// Lookup a Mark.
    pub fn get(&self, id: MarkId) -> Result<Option<Mark>, GeodeError> {
        self.store().get(id)
    }

    /// Total Marks in the trace.
    pub fn mark_count(&self) -> Result<usize, GeodeError> {
        self.store().mark_count()
    }

    /// All ancestors of a Mark plus the Mark itself, root-first,
    /// deduplicated across merge points, topologically ordered.
    pub fn ancestors(&self, id: MarkId) -> Result<Vec<Mark>, GeodeError> {
        let ids = self.index.ancestor_ids(id);
        if ids.is_empty() {
            return Err(GeodeError::MarkNotFound(id));
        }
        let mut marks = Vec::with_capacity(ids.len());
        for ancestor in ids {
            match self.store().get(ancestor)? {
                Some(mark) => marks.push(mark),
                None => return Err(GeodeError::MarkNotFound(ancestor)),
            }
        }
        Ok(marks)
    }

    /// The causal tree rooted at a Mark, ghost siblings included.
    #[must_use]
    pub fn subtree(&self, id: MarkId) -> Option<TreeNode> {
        self.index.subtree(id)
    }

    /// Direct children of a Mark.
    #[must_use]
    pub fn children(&self, id: MarkId) -> Vec<MarkId> {
        self.index.children(id)
    }

    /// Depth of a Mark in its lineage.
    #[must_use]
    pub fn depth(&self, id: MarkId) -> Option<u32> {
        self.index.depth(id)
    }

    /// Distinct Marks reachable from a Mark, self included.
    pub fn subtree_size(&mut self, id: MarkId) -> Option<u64> {
        self.index.subtree_size(id)
    }

    // =========================================================================
    // DISCOVERY
    // =========================================================================

    /// Run edge discovery for one Mark's content against a corpus.
    pub fn discover_for_mark(
        &self,
        id: MarkId,
        corpus: &mut dyn Corpus,
    ) -> Result<DiscoveryReport, GeodeError> {
        let mark = self
            .store()
            .get(id)?
            .ok_or(GeodeError::MarkNotFound(id))?;
        let source = Document::new(format!("mark:{}", id.0), mark.content);
        EdgeDiscoveryEngine::discover(&source, corpus)
    }

    // =========================================================================
    // CRYSTALLIZATION
    // =========================================================================

    /// Crystallize a range of this trace.
    ///
    /// On acceptance the Crystal persists as a derived Mark in one atomic
    /// append; soft failures leave the trace untouched.
    pub fn crystallize(
        &mut self,
        range: (MarkId, MarkId),
        oracle: &dyn DistanceOracle,
    ) -> Result<CrystallizationOutcome, GeodeError> {
        let config = self.config.clone();
        let outcome = match &mut self.backend {
            StorageBackend::InMemory(t) => {
                CrystallizationEngine::crystallize(t, range, oracle, &config)
            }
            StorageBackend::Persistent(t) => {
                CrystallizationEngine::crystallize(t, range, oracle, &config)
            }
        }?;
        self.index.record_append(&outcome.derived_mark);
        Ok(outcome)
    }

    /// Lookup a Crystal.
    pub fn get_crystal(&self, id: CrystalId) -> Result<Option<Crystal>, GeodeError> {
        self.store().get_crystal(id)
    }

    /// Crystals whose source range lies inside `[start, end]`.
    pub fn crystals_in_range(
        &self,
        start: MarkId,
        end: MarkId,
    ) -> Result<Vec<Crystal>, GeodeError> {
        self.store().crystals_in_range(start, end)
    }

    // =========================================================================
    // INDEX MAINTENANCE
    // =========================================================================

    /// Rebuild the index from the store and swap it in whole.
    ///
    /// The replacement is fully built before the swap; no reader of this
    /// handle ever observes a partially-compacted index.
    pub fn rebuild_index(&mut self) -> Result<(), GeodeError> {
        let rebuilt = match &self.backend {
            StorageBackend::InMemory(t) => CausalIndex::rebuild_from(t)?,
            StorageBackend::Persistent(t) => CausalIndex::rebuild_from(t)?,
        };
        self.index = rebuilt;
        Ok(())
    }

    /// Verify store/index coherence: every Mark's parents exist and every
    /// Mark is indexed.
    pub fn verify(&self) -> Result<(), GeodeError> {
        let marks = self.store().all_marks()?;
        for mark in &marks {
            for parent in &mark.parent_ids {
                if !self.store().contains(*parent)? {
                    return Err(GeodeError::ParentNotFound(*parent));
                }
            }
            if !self.index.contains(mark.id) {
                return Err(GeodeError::MarkNotFound(mark.id));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TRACE REGISTRY
// =============================================================================

/// All open traces, one mutex region per trace id.
///
/// There is no process-wide "current trace": every operation names its
/// trace explicitly, and appends to different traces never contend.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    traces: Mutex<BTreeMap<TraceId, Arc<Mutex<Trace>>>>,
    config: EngineConfig,
}

impl TraceRegistry {
    /// Create an empty registry with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose new traces use the given config.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            traces: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    /// Get or create the in-memory trace for an id.
    pub fn open(&self, id: &TraceId) -> Arc<Mutex<Trace>> {
        let mut traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Trace::with_config(self.config.clone()))))
            .clone()
    }

    /// Register an already-opened trace (e.g. a persistent one).
    pub fn insert(&self, id: TraceId, trace: Trace) {
        let mut traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces.insert(id, Arc::new(Mutex::new(trace)));
    }

    /// Run a closure against one trace under its mutex.
    pub fn with_trace<R>(&self, id: &TraceId, f: impl FnOnce(&mut Trace) -> R) -> R {
        let handle = self.open(id);
        let mut trace = handle.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut trace)
    }

    /// Ids of all open traces.
    pub fn trace_ids(&self) -> Vec<TraceId> {
        let traces = self.traces.lock().unwrap_or_else(|e| e.into_inner());
        traces.keys().cloned().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
