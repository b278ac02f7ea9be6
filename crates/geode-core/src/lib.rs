//! # geode-core
//!
//! The witnessed causal trace engine for Geode - THE LOGIC.
//!
//! This crate implements the CORE substrate: an append-only causal record
//! of decisions ("Marks"), a multi-strategy engine that infers typed,
//! confidence-scored relationships between artifacts, and a summarizer
//! that compresses long trace ranges into bounded-size, law-validated
//! "Crystals".
//!
//! ## Architectural Constraints
//!
//! - Append-only: no Mark is ever mutated or deleted; rejected
//!   alternatives are retained as first-class ghost siblings
//! - Deterministic: BTree collections only, fixed confidence bands,
//!   no randomness - two runs over one snapshot agree byte for byte
//! - Single judgment boundary: only crystallization consults the
//!   `DistanceOracle`, and it fails closed when the oracle does
//! - No async, no network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod corpus;
pub mod crystal;
pub mod discovery;
pub mod formats;
pub mod index;
pub mod oracle;
pub mod primitives;
pub mod session;
pub mod signature;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ConceptSignature, Confidence, Crystal, CrystalId, CrystalSeed, DiscoveredEdge, EdgeKind,
    GeodeError, Law, Mark, MarkDraft, MarkId, MarkKind, TraceId,
};

// =============================================================================
// RE-EXPORTS: Store & Index
// =============================================================================

pub use index::{CausalIndex, NodeKind, TreeNode};
pub use storage::RedbTrace;
pub use store::{MemoryTrace, Snapshot, TraceStore};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use crystal::{CrystallizationEngine, CrystallizationOutcome, validate_laws};
pub use discovery::{DiscoveryReport, EdgeDiscoveryEngine};

// =============================================================================
// RE-EXPORTS: Collaborator Seams
// =============================================================================

pub use config::EngineConfig;
pub use corpus::{Corpus, CursorCorpus, Document, MemoryCorpus};
pub use oracle::{CachingOracle, Distance, DistanceOracle, LexicalOracle, OracleError};

// =============================================================================
// RE-EXPORTS: Formats & Session
// =============================================================================

pub use formats::{
    PersistenceHeader, ReloadedTrace, frame_checksum, mark_to_frame, trace_digest,
    trace_from_bytes, trace_to_bytes,
};
pub use session::{StorageBackend, Trace, TraceRegistry};
