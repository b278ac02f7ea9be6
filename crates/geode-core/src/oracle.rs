//! # Distance Oracle Boundary
//!
//! The single external judgment surface in the core. Everything else in
//! this crate is deterministic; semantic distance grading is not, so it is
//! isolated behind one narrow trait. Discovery never calls it; only
//! crystallization does, and fails closed when it is unavailable.
//!
//! Within a caching window the oracle is idempotent; across long horizons
//! it is explicitly not guaranteed reproducible, which is why no oracle
//! output ever feeds back into stored Marks except through a Crystal.

use crate::primitives::{DEFAULT_FIXED_POINT_THRESHOLD, ORACLE_CACHE_WINDOW};
use crate::signature;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// The oracle's verdict on a pair of content strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    /// Semantic loss between the two contents, in [0, 1].
    pub loss: f64,
    /// The contents assert incompatible claims.
    pub is_contradiction: bool,
    /// The pair is semantically stable: restructuring loses almost nothing.
    pub is_fixed_point: bool,
}

/// Oracle-side failures. The engine maps every variant to
/// `GeodeError::OracleUnavailable`; callers never hang on a judgment.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The configured deadline elapsed before a verdict arrived.
    #[error("oracle timed out after {0} ms")]
    Timeout(u64),

    /// The backing service failed or refused.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// The external judgment interface.
///
/// Implementations own their transport and must enforce the configured
/// timeout themselves — a blocked call must surface as
/// `OracleError::Timeout`, never as an indefinite hang. The core is
/// synchronous and cannot preempt an implementation that ignores this.
pub trait DistanceOracle {
    /// Grade the semantic distance between two content strings.
    fn distance(&self, a: &str, b: &str) -> Result<Distance, OracleError>;
}

// =============================================================================
// CACHING WRAPPER
// =============================================================================

/// Memoizes oracle verdicts within a bounded window.
///
/// FIFO eviction at `ORACLE_CACHE_WINDOW` entries. A poisoned cache lock
/// degrades to pass-through rather than failing the judgment.
pub struct CachingOracle<O> {
    inner: O,
    cache: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: BTreeMap<(String, String), Distance>,
    order: VecDeque<(String, String)>,
}

impl<O: DistanceOracle> CachingOracle<O> {
    /// Wrap an oracle with a memoization window.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            cache: Mutex::new(CacheState::default()),
        }
    }

    /// Entries currently cached (test and introspection surface).
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map_or(0, |state| state.entries.len())
    }
}

impl<O: DistanceOracle> DistanceOracle for CachingOracle<O> {
    fn distance(&self, a: &str, b: &str) -> Result<Distance, OracleError> {
        let key = (a.to_string(), b.to_string());
        if let Ok(state) = self.cache.lock() {
            if let Some(distance) = state.entries.get(&key) {
                return Ok(*distance);
            }
        }

        let distance = self.inner.distance(a, b)?;

        if let Ok(mut state) = self.cache.lock() {
            if state.entries.len() >= ORACLE_CACHE_WINDOW {
                if let Some(oldest) = state.order.pop_front() {
                    state.entries.remove(&oldest);
                }
            }
            if state.entries.insert(key.clone(), distance).is_none() {
                state.order.push_back(key);
            }
        }
        Ok(distance)
    }
}

// =============================================================================
// LEXICAL ORACLE
// =============================================================================

/// Deterministic, offline oracle graded from concept signatures.
///
/// Loss is one minus the blended signature overlap of the two contents.
/// This keeps the whole engine unit-testable with no model call; a
/// model-backed adapter implements the same trait out of crate.
#[derive(Debug, Clone)]
pub struct LexicalOracle {
    fixed_point_threshold: f64,
}

impl LexicalOracle {
    /// Oracle with an explicit fixed-point threshold.
    #[must_use]
    pub fn new(fixed_point_threshold: f64) -> Self {
        Self {
            fixed_point_threshold,
        }
    }
}

impl Default for LexicalOracle {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_POINT_THRESHOLD)
    }
}

/// Terms one side negates that the other asserts outside a negation.
fn negated_assertion_overlap(a: &str, b: &str) -> bool {
    let negated_terms = |tokens: &[String]| -> Vec<String> {
        let mut terms = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if matches!(token.as_str(), "not" | "cannot") {
                if let Some(term) = tokens.get(i + 1) {
                    terms.push(term.clone());
                }
            }
        }
        terms
    };

    let tokens_a = signature::tokenize(a);
    let tokens_b = signature::tokenize(b);
    let check = |negated: &[String], other: &[String]| {
        negated.iter().any(|term| {
            other.iter().enumerate().any(|(i, token)| {
                token == term
                    && !matches!(
                        i.checked_sub(1).and_then(|p| other.get(p)).map(String::as_str),
                        Some("not" | "cannot")
                    )
            })
        })
    };
    check(&negated_terms(&tokens_a), &tokens_b) || check(&negated_terms(&tokens_b), &tokens_a)
}

impl DistanceOracle for LexicalOracle {
    fn distance(&self, a: &str, b: &str) -> Result<Distance, OracleError> {
        let sig_a = signature::extract(a);
        let sig_b = signature::extract(b);
        let overlap = 0.5 * signature::jaccard(&sig_a.concepts, &sig_b.concepts)
            + 0.5 * signature::cosine(&sig_a.terms, &sig_b.terms);
        let loss = (1.0 - overlap).clamp(0.0, 1.0);

        Ok(Distance {
            loss,
            is_contradiction: negated_assertion_overlap(a, b),
            is_fixed_point: loss < self.fixed_point_threshold,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
