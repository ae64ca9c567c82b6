use serde::{Deserialize, Serialize};

use crate::{DetectedMatch, MatchCandidate, Verdict, analysis::{correlation::ScoreMap, exclusion::ExclusionZone}, audit::AuditLog, error::{ForensicsError, Result}};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// What to do with several accepted positions describing the same clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Report every position over the threshold.
    #[default]
    KeepAll,
    /// Keep the best-scoring position of each overlapping cluster.
    SuppressOverlapping,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<DetectedMatch>,
    pub discarded: usize,
    pub suppressed: usize,
}

impl FilterOutcome {
    pub fn verdict(&self) -> Verdict {
        if self.accepted.is_empty() {
            Verdict::NoCloningDetected
        } else {
            Verdict::CloningDetected
        }
    }
}

pub struct MatchFilter {
    threshold: f64,
    policy: DuplicatePolicy,
}

impl MatchFilter {
    pub fn new(threshold: f64, policy: DuplicatePolicy) -> Result<Self> {
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(ForensicsError::InvalidParameter(format!(
                "Similarity threshold must lie in [-1, 1], got {}",
                threshold
            )));
        }

        Ok(Self { threshold, policy })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn apply(&self, scores: &ScoreMap, zone: &ExclusionZone, log: &AuditLog) -> FilterOutcome {
        let (width, height) = scores.template_size();
        let candidates = scores.candidates(self.threshold);
        self.filter_candidates(&candidates, width, height, zone, log)
    }

    pub fn filter_candidates(
        &self,
        candidates: &[MatchCandidate],
        width: u32,
        height: u32,
        zone: &ExclusionZone,
        log: &AuditLog,
    ) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for candidate in candidates.iter().filter(|c| c.score >= self.threshold) {
            let region = candidate.bounds(width, height);
            if zone.contains(&region) {
                outcome.discarded += 1;
                log.debug(format!(
                    "Ignored location at: ({}, {}) as it overlaps with the excluded region",
                    candidate.x, candidate.y
                ));
            } else {
                outcome.accepted.push(DetectedMatch {
                    region,
                    similarity: candidate.score,
                });
            }
        }

        if self.policy == DuplicatePolicy::SuppressOverlapping {
            let before = outcome.accepted.len();
            outcome.accepted = Self::suppress_overlapping(outcome.accepted);
            outcome.suppressed = before - outcome.accepted.len();
        }

        for m in &outcome.accepted {
            log.info(format!(
                "Cloning detected at: ({}, {}) similarity {:.3}",
                m.region.x, m.region.y, m.similarity
            ));
        }

        outcome
    }

    fn suppress_overlapping(mut matches: Vec<DetectedMatch>) -> Vec<DetectedMatch> {
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        let mut kept: Vec<DetectedMatch> = Vec::new();
        for m in matches {
            if !kept.iter().any(|existing| existing.region.overlaps(&m.region)) {
                kept.push(m);
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;
    use crate::Rect;

    fn zone() -> ExclusionZone {
        // selection (100, 100, 50, 50) -> zone (95, 95, 60, 60)
        ExclusionZone::around(Rect::new(100, 100, 50, 50), 800, 800, 1.2).unwrap()
    }

    fn candidate(x: u32, y: u32, score: f64) -> MatchCandidate {
        MatchCandidate { x, y, score }
    }

    #[test]
    fn test_self_match_is_discarded() {
        let log = AuditLog::in_memory();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        let outcome = filter.filter_candidates(&[candidate(100, 100, 1.0)], 50, 50, &zone(), &log);

        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.discarded, 1);
        assert_eq!(outcome.verdict(), Verdict::NoCloningDetected);
        assert!(log.contains(Level::Debug, "Ignored location at: (100, 100)"));
    }

    #[test]
    fn test_shift_inside_zone_is_discarded() {
        let log = AuditLog::disabled();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        let candidates = [candidate(95, 95, 0.9), candidate(105, 105, 0.9)];
        let outcome = filter.filter_candidates(&candidates, 50, 50, &zone(), &log);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.discarded, 2);
    }

    #[test]
    fn test_partial_overlap_with_zone_is_accepted() {
        let log = AuditLog::disabled();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        // right edge at 156, one past the zone
        let outcome = filter.filter_candidates(&[candidate(106, 100, 0.85)], 50, 50, &zone(), &log);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].region, Rect::new(106, 100, 50, 50));
    }

    #[test]
    fn test_distinct_clone_is_accepted_and_logged() {
        let log = AuditLog::in_memory();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        let outcome = filter.filter_candidates(&[candidate(600, 600, 0.97)], 50, 50, &zone(), &log);

        assert_eq!(outcome.verdict(), Verdict::CloningDetected);
        assert_eq!(outcome.accepted[0].similarity, 0.97);
        assert!(log.contains(Level::Info, "Cloning detected at: (600, 600)"));
    }

    #[test]
    fn test_below_threshold_is_ignored() {
        let log = AuditLog::disabled();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        let outcome = filter.filter_candidates(&[candidate(600, 600, 0.79)], 50, 50, &zone(), &log);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.discarded, 0);
    }

    #[test]
    fn test_keep_all_reports_adjacent_positions() {
        let log = AuditLog::disabled();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::KeepAll).unwrap();
        let candidates = [candidate(600, 600, 0.95), candidate(601, 600, 0.9), candidate(600, 601, 0.88)];
        let outcome = filter.filter_candidates(&candidates, 50, 50, &zone(), &log);
        assert_eq!(outcome.accepted.len(), 3);
        assert_eq!(outcome.suppressed, 0);
    }

    #[test]
    fn test_suppression_keeps_best_of_cluster() {
        let log = AuditLog::disabled();
        let filter = MatchFilter::new(0.8, DuplicatePolicy::SuppressOverlapping).unwrap();
        let candidates = [
            candidate(300, 300, 0.86),
            candidate(600, 600, 0.90),
            candidate(601, 600, 0.99),
            candidate(600, 601, 0.88),
        ];
        let outcome = filter.filter_candidates(&candidates, 50, 50, &zone(), &log);

        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.suppressed, 2);
        assert_eq!(outcome.accepted[0].region.x, 601);
        assert_eq!(outcome.accepted[1].region.x, 300);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        assert!(MatchFilter::new(1.5, DuplicatePolicy::KeepAll).is_err());
        assert!(MatchFilter::new(f64::NAN, DuplicatePolicy::KeepAll).is_err());
    }
}
