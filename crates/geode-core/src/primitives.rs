//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Geode CORE.
//!
//! Geode starts with zero data but fixed logic. These primitives are
//! compiled into the binary and are immutable at runtime. Confidence bands
//! in particular are fixed rather than caller-tunable: two runs over the
//! same snapshot must score identically.

/// Magic bytes for the Geode binary trace format header.
///
/// - File Header = Magic Bytes ("GEOD") + Version (u8) before the frames.
pub const MAGIC_BYTES: &[u8; 4] = b"GEOD";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// SIGNIFICANCE THRESHOLDS
// =============================================================================

/// Confidence above which a Mark counts as a peak.
///
/// The comparison is strict: a Mark at exactly 0.7 is not a peak.
/// Crystallization must preserve every peak or name it as a gap.
pub const PEAK_THRESHOLD: f64 = 0.7;

/// Upper bound on `summary bytes / range bytes` for an accepted Crystal.
///
/// Exceeding this after the greediest reduction fails the crystallization
/// rather than silently dropping peaks.
pub const MAX_COMPRESSION_RATIO: f64 = 0.10;

/// Minimum fraction of peaks that must be selected or acknowledged
/// for the DelightPreservation law to hold.
pub const DELIGHT_COVERAGE: f64 = 0.80;

/// Ghost-to-total ratio below which a range counts as low-novelty.
///
/// The SterilityAlert law requires the summary to say so out loud.
pub const NOVELTY_FLOOR: f64 = 0.05;

/// Default oracle loss below which range endpoints count as a fixed point.
///
/// Overridable via `EngineConfig`; the compiled value is the fallback.
pub const DEFAULT_FIXED_POINT_THRESHOLD: f64 = 0.15;

// =============================================================================
// DISCOVERY CONFIDENCE BANDS (fixed, not caller-tunable)
// =============================================================================

/// Explicit strategy: structured link classified by a cue word.
pub const EXPLICIT_CLASSIFIED_CONFIDENCE: f64 = 0.95;

/// Explicit strategy: unstructured reference token with no cue word.
pub const EXPLICIT_TOKEN_CONFIDENCE: f64 = 0.90;

/// Semantic strategy: concept overlap alone cleared the mention floor.
pub const MENTIONS_CONFIDENCE: f64 = 0.75;

/// Semantic strategy: minimum concept Jaccard for a `mentions` edge.
pub const MENTION_OVERLAP_FLOOR: f64 = 0.20;

/// Semantic strategy: combined score floor for a `similar_to` edge.
pub const SIMILARITY_FLOOR: f64 = 0.50;

/// Semantic strategy: `similar_to` confidence = BASE + SCALE * score.
pub const SIMILARITY_BASE: f64 = 0.5;

/// Semantic strategy: slope applied to the combined score.
pub const SIMILARITY_SCALE: f64 = 0.35;

/// Structural strategy: layer-adjacent lineage edges.
pub const STRUCTURAL_CONFIDENCE: f64 = 0.65;

/// Contradiction strategy: modal negation ("cannot X") against an assertion.
pub const CONTRADICTION_MODAL_CONFIDENCE: f64 = 0.60;

/// Contradiction strategy: plain negation ("not X", "isn't X").
pub const CONTRADICTION_CONFIDENCE: f64 = 0.55;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for Mark content strings (256 KiB).
///
/// Content longer than this is rejected at append time.
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_CONTENT_LENGTH: usize = 262_144;

/// Maximum length for author strings.
pub const MAX_AUTHOR_LENGTH: usize = 256;

/// Maximum length for a ghost's unchosen reason.
pub const MAX_REASON_LENGTH: usize = 4096;

/// Maximum number of parents on a single Mark (merge fan-in bound).
pub const MAX_PARENTS: usize = 16;

/// Maximum number of tags on a single Mark.
pub const MAX_TAGS: usize = 32;

/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 128;

/// Maximum corpus documents consumed by a single discovery run.
///
/// Hitting this cap is not an error: the run returns partial results
/// with the truncation flag raised.
pub const MAX_CORPUS_DOCS: usize = 10_000;

// =============================================================================
// CRYSTALLIZATION SHAPING
// =============================================================================

/// Characters of content quoted per selected Mark in a summary.
pub const EXCERPT_LENGTH: usize = 96;

/// Shortest excerpt the greedy reduction will shrink to.
pub const MIN_EXCERPT_LENGTH: usize = 24;

/// Default lexical-signal set for the WarmthRequirement law.
///
/// Swappable via `EngineConfig`; the law only demands that at least one
/// term from the active set appears in the summary text.
pub const DEFAULT_WARMTH_LEXICON: &[&str] = &["delight", "spark", "warmth", "alive", "wonder"];

// =============================================================================
// ORACLE BOUNDARY
// =============================================================================

/// Default timeout for a single DistanceOracle call, in milliseconds.
pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 5_000;

/// Entries retained by the caching oracle wrapper.
pub const ORACLE_CACHE_WINDOW: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"GEOD");
    }

    #[test]
    fn bands_are_within_unit_interval() {
        for band in [
            EXPLICIT_CLASSIFIED_CONFIDENCE,
            EXPLICIT_TOKEN_CONFIDENCE,
            MENTIONS_CONFIDENCE,
            STRUCTURAL_CONFIDENCE,
            CONTRADICTION_MODAL_CONFIDENCE,
            CONTRADICTION_CONFIDENCE,
        ] {
            assert!((0.0..=1.0).contains(&band));
        }
    }

    #[test]
    fn contradiction_band_is_ordered() {
        // Plain negation must score below modal negation, both inside [0.55, 0.60].
        assert!(CONTRADICTION_CONFIDENCE <= CONTRADICTION_MODAL_CONFIDENCE);
        assert!(CONTRADICTION_CONFIDENCE >= 0.55);
        assert!(CONTRADICTION_MODAL_CONFIDENCE <= 0.60);
    }
}
