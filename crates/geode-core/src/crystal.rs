//! # Crystallization Engine
//!
//! Compresses a trace range into a bounded-size, law-validated Crystal.
//!
//! Selection keeps every peak, anchors the range ends, and greedily fills
//! with honest-gap ghosts. The summary must land under the compression
//! budget after the greediest reduction or the whole run fails with
//! `BudgetExceeded` — peaks are never silently dropped to fit.
//!
//! The only external call is the distance oracle, used once per run to
//! grade endpoint stability. Instability is surfaced as a concrete drift
//! point in the summary, never hidden. An accepted Crystal is persisted as
//! one atomic append of a derived Mark plus the crystal record, so a run
//! abandoned at any earlier step leaves nothing behind.

use crate::config::EngineConfig;
use crate::corpus::Document;
use crate::discovery::EdgeDiscoveryEngine;
use crate::oracle::DistanceOracle;
use crate::primitives::{
    DELIGHT_COVERAGE, EXCERPT_LENGTH, MAX_COMPRESSION_RATIO, MIN_EXCERPT_LENGTH, NOVELTY_FLOOR,
};
use crate::signature;
use crate::{
    Crystal, CrystalSeed, EdgeKind, GeodeError, Law, Mark, MarkDraft, MarkId, MarkKind, TraceStore,
};
use std::collections::BTreeSet;

/// An accepted crystallization: the Crystal and the derived Mark that
/// carries it back into the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystallizationOutcome {
    pub crystal: Crystal,
    pub derived_mark: Mark,
}

/// Render a Mark id the way summaries cite it.
fn cite(id: MarkId) -> String {
    format!("mark:{}", id.0)
}

/// First `len` characters of the first content line.
fn excerpt(content: &str, len: usize) -> String {
    content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(len)
        .collect()
}

/// Whether a ghost's rejection references any peak: by the chosen-sibling
/// back-reference, or by concept overlap between the reason and a peak.
fn references_peak(ghost: &Mark, peaks: &[Mark]) -> bool {
    let MarkKind::Ghost {
        unchosen_reason,
        chosen_sibling,
    } = &ghost.kind
    else {
        return false;
    };
    if peaks.iter().any(|p| p.id == *chosen_sibling) {
        return true;
    }
    let reason_sig = signature::extract(unchosen_reason);
    peaks.iter().any(|peak| {
        let peak_sig = signature::extract(&peak.content);
        reason_sig.concepts.intersection(&peak_sig.concepts).next().is_some()
    })
}

/// The stability rationale for a range, derived from one oracle verdict
/// and the discovery run over the closing mark.
struct StabilityLine {
    text: String,
    loss: f64,
}

/// The engine is stateless; every run reads the store and writes at most
/// one atomic append.
pub struct CrystallizationEngine;

impl CrystallizationEngine {
    /// Crystallize `[range.0, range.1]` of a trace.
    ///
    /// Soft failures (`BudgetExceeded`, `OracleUnavailable`,
    /// `LawViolation`) leave the store untouched; the caller may widen the
    /// budget, wait out the oracle, or accept the rejection.
    pub fn crystallize<S: TraceStore>(
        store: &mut S,
        range: (MarkId, MarkId),
        oracle: &dyn DistanceOracle,
        config: &EngineConfig,
    ) -> Result<CrystallizationOutcome, GeodeError> {
        let (start, end) = range;
        if start > end {
            return Err(GeodeError::InvalidMark("inverted range".to_string()));
        }
        let marks = store.marks_in_range(start, end)?;
        let Some(first) = marks.first().cloned() else {
            return Err(GeodeError::MarkNotFound(start));
        };
        if first.id != start {
            return Err(GeodeError::MarkNotFound(start));
        }
        let last = marks.last().cloned().unwrap_or_else(|| first.clone());
        if last.id != end {
            return Err(GeodeError::MarkNotFound(end));
        }

        // Step 1: peaks.
        let peaks: Vec<Mark> = marks.iter().filter(|m| m.is_peak()).cloned().collect();

        // Step 2: honest-gap candidates.
        let gaps: Vec<Mark> = marks
            .iter()
            .filter(|m| m.is_ghost() && references_peak(m, &peaks))
            .cloned()
            .collect();

        // Stability rationale: discovery over the closing mark, then the
        // single oracle call. The oracle failing fails the run closed.
        let stability = Self::stability_line(&marks, &first, &last, oracle, config)?;

        let ghost_count = marks.iter().filter(|m| m.is_ghost()).count();
        let ghost_ratio = ghost_count as f64 / marks.len() as f64;
        let total_bytes = marks.iter().map(|m| m.content.len()).sum::<usize>().max(1);
        let budget_bytes = (total_bytes as f64 * MAX_COMPRESSION_RATIO).floor() as usize;

        // Step 3: greedy reduction. Gaps go first, then excerpts shrink,
        // then peaks fall back to bare citations. Never below that.
        let mut gap_count = gaps.len();
        let mut excerpt_len = EXCERPT_LENGTH;
        let summary = loop {
            let candidate = Self::render_summary(
                &first,
                &last,
                &marks,
                &peaks,
                &gaps[..gap_count],
                excerpt_len,
                ghost_count,
                ghost_ratio,
                &stability,
                config,
            );
            if candidate.len() <= budget_bytes {
                break candidate;
            }
            if gap_count > 0 {
                gap_count -= 1;
            } else if excerpt_len > MIN_EXCERPT_LENGTH {
                excerpt_len = MIN_EXCERPT_LENGTH;
            } else if excerpt_len > 0 {
                excerpt_len = 0;
            } else {
                let ratio = candidate.len() as f64 / total_bytes as f64;
                tracing::warn!(ratio, budget = MAX_COMPRESSION_RATIO, "crystallization over budget");
                return Err(GeodeError::BudgetExceeded {
                    ratio,
                    budget: MAX_COMPRESSION_RATIO,
                });
            }
        };

        let compression_ratio = summary.len() as f64 / total_bytes as f64;

        // selected = anchors + peaks + kept gaps, ascending, deduplicated.
        let mut selected: BTreeSet<MarkId> = BTreeSet::new();
        selected.insert(first.id);
        selected.insert(last.id);
        selected.extend(peaks.iter().map(|p| p.id));
        selected.extend(gaps[..gap_count].iter().map(|g| g.id));
        let selected_marks: Vec<MarkId> = selected.iter().copied().collect();
        let preserved_peaks: BTreeSet<MarkId> = peaks.iter().map(|p| p.id).collect();

        // All laws must hold before anything is persisted.
        validate_laws(&summary, &preserved_peaks, &selected, ghost_ratio, config)?;

        let seed = CrystalSeed {
            source_range: (first.id, last.id),
            selected_marks,
            summary_text: summary.clone(),
            compression_ratio,
            preserved_peaks,
        };
        let draft = MarkDraft::derived("geode", summary, vec![last.id], 1.0 - stability.loss)
            .with_tags(["crystal".to_string()]);
        let (crystal, derived_mark) = store.append_crystal(seed, draft)?;

        tracing::debug!(
            crystal = crystal.id.0,
            ratio = crystal.compression_ratio,
            peaks = crystal.preserved_peaks.len(),
            "crystal accepted"
        );
        Ok(CrystallizationOutcome {
            crystal,
            derived_mark,
        })
    }

    /// Grade endpoint stability and phrase the rationale.
    fn stability_line(
        marks: &[Mark],
        first: &Mark,
        last: &Mark,
        oracle: &dyn DistanceOracle,
        config: &EngineConfig,
    ) -> Result<StabilityLine, GeodeError> {
        // Discovery over the closing mark against the rest of the range.
        let source = Document::new(cite(last.id), last.content.clone());
        let docs: Vec<Document> = marks
            .iter()
            .filter(|m| m.id != last.id)
            .map(|m| Document::new(cite(m.id), m.content.clone()))
            .collect();
        let report = EdgeDiscoveryEngine::discover_drained(&source, &docs, false);

        let distance = oracle
            .distance(&first.content, &last.content)
            .map_err(|e| GeodeError::OracleUnavailable(e.to_string()))?;

        let text = if distance.loss < config.fixed_point_threshold {
            format!(
                "stability: distance {:.3} below fixed-point threshold {:.3}",
                distance.loss, config.fixed_point_threshold
            )
        } else {
            // Instability needs a concrete drift point: a contradiction
            // from the closing mark if discovery found one, else the
            // endpoint divergence itself.
            let drift = report
                .edges
                .iter()
                .find(|e| e.kind == EdgeKind::Contradicts)
                .map(|e| format!("{} now contradicted by the closing mark", e.target_id))
                .unwrap_or_else(|| {
                    format!(
                        "endpoint divergence {}..{} at loss {:.3}",
                        cite(first.id),
                        cite(last.id),
                        distance.loss
                    )
                });
            let endpoint_note = if distance.is_contradiction {
                " (endpoints contradict)"
            } else {
                ""
            };
            format!("drift: {drift}{endpoint_note}")
        };
        Ok(StabilityLine {
            text,
            loss: distance.loss,
        })
    }

    /// Deterministic summary layout. Byte size is what the budget meters.
    fn render_summary(
        first: &Mark,
        last: &Mark,
        marks: &[Mark],
        peaks: &[Mark],
        gaps: &[Mark],
        excerpt_len: usize,
        ghost_count: usize,
        ghost_ratio: f64,
        stability: &StabilityLine,
        config: &EngineConfig,
    ) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "crystal of {}..{} ({} marks, {} peaks)\n",
            cite(first.id),
            cite(last.id),
            marks.len(),
            peaks.len()
        ));

        for peak in peaks {
            if excerpt_len == 0 {
                out.push_str(&format!("* {} [{:.2}]\n", cite(peak.id), peak.confidence.value()));
            } else {
                out.push_str(&format!(
                    "* {} [{:.2}] {}\n",
                    cite(peak.id),
                    peak.confidence.value(),
                    excerpt(&peak.content, excerpt_len)
                ));
            }
        }

        out.push_str(&format!("anchors: {}, {}\n", cite(first.id), cite(last.id)));

        for gap in gaps {
            if let MarkKind::Ghost { unchosen_reason, .. } = &gap.kind {
                out.push_str(&format!(
                    "gap: {} ghost \"{}\"\n",
                    cite(gap.id),
                    excerpt(unchosen_reason, excerpt_len.max(MIN_EXCERPT_LENGTH))
                ));
            }
        }

        out.push_str(&stability.text);
        out.push('\n');

        if ghost_ratio < NOVELTY_FLOOR {
            out.push_str(&format!(
                "novelty: low-novelty range ({ghost_count} ghosts / {} marks)\n",
                marks.len()
            ));
        } else {
            out.push_str(&format!(
                "novelty: {ghost_count} ghosts / {} marks\n",
                marks.len()
            ));
        }

        let warmth = config
            .warmth_lexicon
            .first()
            .map(String::as_str)
            .unwrap_or("warmth");
        out.push_str(&format!("warmth: {warmth}\n"));
        out
    }
}

// =============================================================================
// PRESERVATION LAWS
// =============================================================================

/// Check every preservation law against a finished summary.
///
/// Kept separate from generation so the checks stay meaningful: the
/// generator aims to satisfy them, this function refuses to take that on
/// faith.
pub fn validate_laws(
    summary: &str,
    peaks: &BTreeSet<MarkId>,
    selected: &BTreeSet<MarkId>,
    ghost_ratio: f64,
    config: &EngineConfig,
) -> Result<(), GeodeError> {
    // DelightPreservation: >= 80% of peaks selected or named in the text.
    if !peaks.is_empty() {
        let covered = peaks
            .iter()
            .filter(|id| selected.contains(id) || summary.contains(&cite(**id)))
            .count();
        let coverage = covered as f64 / peaks.len() as f64;
        if coverage + 1e-9 < DELIGHT_COVERAGE {
            return Err(GeodeError::LawViolation {
                law: Law::DelightPreservation,
            });
        }
    }

    // WarmthRequirement: at least one lexical signal present.
    let lowered = summary.to_lowercase();
    if !config
        .warmth_lexicon
        .iter()
        .any(|term| lowered.contains(&term.to_lowercase()))
    {
        return Err(GeodeError::LawViolation {
            law: Law::WarmthRequirement,
        });
    }

    // SterilityAlert: a low-novelty range must say so.
    if ghost_ratio < NOVELTY_FLOOR && !lowered.contains("low-novelty") {
        return Err(GeodeError::LawViolation {
            law: Law::SterilityAlert,
        });
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Distance, LexicalOracle, OracleError};
    use crate::MemoryTrace;

    struct FailingOracle;
    impl DistanceOracle for FailingOracle {
        fn distance(&self, _: &str, _: &str) -> Result<Distance, OracleError> {
            Err(OracleError::Timeout(5_000))
        }
    }

    /// A trace with `total` marks, peaks at the given offsets, and enough
    /// content bytes per mark that summaries fit the ratio budget.
    fn seeded_trace(total: usize, peak_at: &[usize]) -> (MemoryTrace, MarkId, MarkId) {
        let mut trace = MemoryTrace::new();
        let mut prev: Option<MarkId> = None;
        let mut start = MarkId(0);
        let mut end = MarkId(0);
        for i in 0..total {
            let confidence = if peak_at.contains(&i) { 0.9 } else { 0.4 };
            let content = format!(
                "step {i}: considered the layout of partition {i} and recorded {}",
                "observations ".repeat(6)
            );
            let parents = prev.map(|p| vec![p]).unwrap_or_default();
            let mark = trace
                .append_mark(MarkDraft::chosen("ada", content, parents, confidence))
                .expect("append");
            if i == 0 {
                start = mark.id;
            }
            end = mark.id;
            prev = Some(mark.id);
        }
        (trace, start, end)
    }

    #[test]
    fn crystal_respects_ratio_and_preserves_peaks() {
        let (mut trace, start, end) = seeded_trace(100, &[10, 40, 70]);
        let config = EngineConfig::default();

        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (start, end),
            &LexicalOracle::default(),
            &config,
        )
        .expect("crystallize");

        assert!(outcome.crystal.compression_ratio <= 0.10);
        assert_eq!(outcome.crystal.preserved_peaks.len(), 3);
        for peak in &outcome.crystal.preserved_peaks {
            assert!(outcome.crystal.selected_marks.contains(peak));
            assert!(outcome.crystal.summary_text.contains(&cite(*peak)));
        }
    }

    #[test]
    fn anchors_selected_even_when_not_peaks() {
        let (mut trace, start, end) = seeded_trace(50, &[25]);
        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (start, end),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert!(outcome.crystal.selected_marks.contains(&start));
        assert!(outcome.crystal.selected_marks.contains(&end));
    }

    #[test]
    fn crystal_persisted_as_derived_mark_atomically() {
        let (mut trace, start, end) = seeded_trace(30, &[5]);
        let before = trace.mark_count().expect("count");

        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (start, end),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert_eq!(trace.mark_count().expect("count"), before + 1);
        assert_eq!(outcome.derived_mark.kind, MarkKind::Derived);
        assert!(outcome.derived_mark.tags.contains("crystal"));
        assert_eq!(outcome.derived_mark.parent_ids, vec![end]);
        assert_eq!(
            trace.crystals_in_range(start, end).expect("range").len(),
            1
        );
    }

    #[test]
    fn oracle_failure_fails_closed_and_leaves_store_untouched() {
        let (mut trace, start, end) = seeded_trace(30, &[5]);
        let before = trace.mark_count().expect("count");

        let result = CrystallizationEngine::crystallize(
            &mut trace,
            (start, end),
            &FailingOracle,
            &EngineConfig::default(),
        );

        assert!(matches!(result, Err(GeodeError::OracleUnavailable(_))));
        assert_eq!(trace.mark_count().expect("count"), before);
    }

    #[test]
    fn over_budget_fails_rather_than_dropping_peaks() {
        // Tiny contents: even a citation-only summary cannot fit 10%.
        let mut trace = MemoryTrace::new();
        let root = trace
            .append_mark(MarkDraft::chosen("ada", "a", vec![], 0.9))
            .expect("append");
        let next = trace
            .append_mark(MarkDraft::chosen("ada", "b", vec![root.id], 0.9))
            .expect("append");

        let result = CrystallizationEngine::crystallize(
            &mut trace,
            (root.id, next.id),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        );

        assert!(matches!(result, Err(GeodeError::BudgetExceeded { .. })));
        assert_eq!(trace.mark_count().expect("count"), 2);
    }

    #[test]
    fn honest_gap_ghost_joins_selection() {
        let mut trace = MemoryTrace::new();
        let root = trace
            .append_mark(MarkDraft::chosen(
                "ada",
                format!("declare the partition goal {}", "context ".repeat(200)),
                vec![],
                0.9,
            ))
            .expect("append");
        let ghost = trace
            .append_mark(MarkDraft::ghost(
                "ada",
                format!("alternative partition layout {}", "detail ".repeat(200)),
                vec![],
                "rejected because the partition goal won",
                root.id,
            ))
            .expect("append");
        let end = trace
            .append_mark(MarkDraft::chosen(
                "ada",
                format!("carry the partition goal forward {}", "notes ".repeat(200)),
                vec![root.id],
                0.5,
            ))
            .expect("append");

        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (root.id, end.id),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert!(outcome.crystal.selected_marks.contains(&ghost.id));
        assert!(outcome.crystal.summary_text.contains(&cite(ghost.id)));
    }

    #[test]
    fn ghost_free_range_carries_low_novelty_notice() {
        let (mut trace, start, end) = seeded_trace(40, &[20]);
        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (start, end),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert!(outcome.crystal.summary_text.contains("low-novelty"));
    }

    #[test]
    fn drift_is_surfaced_when_endpoints_diverge() {
        let mut trace = MemoryTrace::new();
        let root = trace
            .append_mark(MarkDraft::chosen(
                "ada",
                format!("the storage engine favors immutable segments {}", "filler ".repeat(150)),
                vec![],
                0.9,
            ))
            .expect("append");
        let end = trace
            .append_mark(MarkDraft::chosen(
                "ada",
                format!("pivot entirely toward streaming replication {}", "padding ".repeat(150)),
                vec![root.id],
                0.5,
            ))
            .expect("append");

        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (root.id, end.id),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert!(outcome.crystal.summary_text.contains("drift:"));
        assert!(!outcome.crystal.summary_text.contains("stability:"));
    }

    #[test]
    fn stability_cited_when_endpoints_agree() {
        let mut trace = MemoryTrace::new();
        let content = format!("the partition layout stays immutable {}", "notes ".repeat(200));
        let root = trace
            .append_mark(MarkDraft::chosen("ada", content.clone(), vec![], 0.9))
            .expect("append");
        let end = trace
            .append_mark(MarkDraft::chosen("ada", content, vec![root.id], 0.8))
            .expect("append");

        let outcome = CrystallizationEngine::crystallize(
            &mut trace,
            (root.id, end.id),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert!(outcome.crystal.summary_text.contains("stability: distance"));
    }

    #[test]
    fn inverted_or_missing_range_rejected() {
        let (mut trace, start, end) = seeded_trace(5, &[]);

        let inverted = CrystallizationEngine::crystallize(
            &mut trace,
            (end, start),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        );
        assert!(matches!(inverted, Err(GeodeError::InvalidMark(_))));

        let missing = CrystallizationEngine::crystallize(
            &mut trace,
            (MarkId(90), MarkId(95)),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        );
        assert!(matches!(missing, Err(GeodeError::MarkNotFound(_))));
    }

    #[test]
    fn summary_text_is_deterministic_for_equal_ranges() {
        let (mut trace_a, start, end) = seeded_trace(60, &[15, 45]);
        let (mut trace_b, _, _) = seeded_trace(60, &[15, 45]);

        let a = CrystallizationEngine::crystallize(
            &mut trace_a,
            (start, end),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");
        let b = CrystallizationEngine::crystallize(
            &mut trace_b,
            (start, end),
            &LexicalOracle::default(),
            &EngineConfig::default(),
        )
        .expect("crystallize");

        assert_eq!(a.crystal.summary_text, b.crystal.summary_text);
        assert_eq!(a.crystal.compression_ratio, b.crystal.compression_ratio);
    }

    // =========================================================================
    // LAW VALIDATION
    // =========================================================================

    #[test]
    fn law_delight_fails_when_peaks_uncovered() {
        let peaks: BTreeSet<MarkId> = [MarkId(1), MarkId(2), MarkId(3), MarkId(4), MarkId(5)]
            .into_iter()
            .collect();
        let selected: BTreeSet<MarkId> = [MarkId(1)].into_iter().collect();

        let result = validate_laws(
            "warmth: delight",
            &peaks,
            &selected,
            0.5,
            &EngineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(GeodeError::LawViolation {
                law: Law::DelightPreservation
            })
        ));
    }

    #[test]
    fn law_delight_accepts_acknowledged_gaps() {
        let peaks: BTreeSet<MarkId> = [MarkId(1), MarkId(2)].into_iter().collect();
        let selected: BTreeSet<MarkId> = [MarkId(1)].into_iter().collect();

        // mark:2 is not selected but named in the text.
        let result = validate_laws(
            "acknowledged gap mark:2\nwarmth: delight",
            &peaks,
            &selected,
            0.5,
            &EngineConfig::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn law_warmth_fails_without_lexicon_term() {
        let result = validate_laws(
            "a perfectly dry summary",
            &BTreeSet::new(),
            &BTreeSet::new(),
            0.5,
            &EngineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(GeodeError::LawViolation {
                law: Law::WarmthRequirement
            })
        ));
    }

    #[test]
    fn law_warmth_respects_swapped_lexicon() {
        let mut config = EngineConfig::default();
        config.warmth_lexicon = vec!["glow".to_string()];

        assert!(validate_laws("full of glow", &BTreeSet::new(), &BTreeSet::new(), 0.5, &config).is_ok());
        assert!(validate_laws("full of delight", &BTreeSet::new(), &BTreeSet::new(), 0.5, &config).is_err());
    }

    #[test]
    fn law_sterility_fails_without_notice() {
        let result = validate_laws(
            "warmth: delight",
            &BTreeSet::new(),
            &BTreeSet::new(),
            0.0,
            &EngineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(GeodeError::LawViolation {
                law: Law::SterilityAlert
            })
        ));

        let with_notice = validate_laws(
            "low-novelty range\nwarmth: delight",
            &BTreeSet::new(),
            &BTreeSet::new(),
            0.0,
            &EngineConfig::default(),
        );
        assert!(with_notice.is_ok());
    }
}
