//! Risk factor extraction, safety scoring and tier classification.
//!
//! Everything here is a pure function of its inputs. Scoring the same
//! snapshot twice always yields the same [`RiskAssessment`].
//!
//! Two threshold policies exist and are deliberately kept apart:
//!
//! - [`TierPolicy`] buckets a score into safe / caution / danger for score cards
//!   (defaults: `> 70`, `> 40`, rest).
//! - [`AtRiskPolicy`] decides whether a tourist is surfaced in the at-risk list
//!   at all (default: `< 70`).
//!
//! The cut points disagree at exactly 70. Both are configurable on their own.

use crate::model::{
    AssessmentResponse, AtRiskTourist, DirectoryQuery, RiskAssessment, RiskFactor, ScoreTier,
    TierSummary, TouristDirectory, TouristTelemetrySnapshot,
};

/// Starting score before deductions.
const BASE_SCORE: u8 = 100;

/// Return the factors triggered by a snapshot, in evaluation order.
pub fn risk_factors(snapshot: &TouristTelemetrySnapshot) -> Vec<RiskFactor> {
    RiskFactor::ALL
        .into_iter()
        .filter(|factor| factor.is_triggered(snapshot))
        .collect()
}

/// Reduce a factor set to a score.
///
/// Deductions simply add up; the result never drops below zero.
pub fn safety_score(factors: &[RiskFactor]) -> u8 {
    let total: u32 = factors.iter().map(|f| u32::from(f.deduction())).sum();
    u32::from(BASE_SCORE).saturating_sub(total) as u8
}

/// Score a snapshot.
pub fn assess(snapshot: &TouristTelemetrySnapshot) -> RiskAssessment {
    let factors = risk_factors(snapshot);
    let score = safety_score(&factors);
    RiskAssessment { factors, score }
}

/// Three-tier classification used by safety-score cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// Scores strictly above this are `Safe`.
    pub safe_above: u8,
    /// Scores strictly above this (and not safe) are `Caution`.
    pub caution_above: u8,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            safe_above: 70,
            caution_above: 40,
        }
    }
}

impl TierPolicy {
    /// Returns `None` unless `safe_above > caution_above`. Otherwise the
    /// caution band would be empty.
    pub fn new(safe_above: u8, caution_above: u8) -> Option<Self> {
        (safe_above > caution_above).then_some(Self {
            safe_above,
            caution_above,
        })
    }

    pub fn classify(&self, score: u8) -> ScoreTier {
        if score > self.safe_above {
            ScoreTier::Safe
        } else if score > self.caution_above {
            ScoreTier::Caution
        } else {
            ScoreTier::Danger
        }
    }
}

impl TierPolicy {
    /// Score a snapshot and attach its tier.
    pub fn score_card(&self, snapshot: &TouristTelemetrySnapshot) -> AssessmentResponse {
        let assessment = assess(snapshot);
        let tier = self.classify(assessment.score);
        AssessmentResponse {
            tourist_id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            score: assessment.score,
            factors: assessment.factors,
            tier,
            color: tier.color(),
        }
    }

    /// Score every snapshot, count tiers over all of them and keep the
    /// cards matching `query`.
    pub fn directory<'a, I>(&self, snapshots: I, query: &DirectoryQuery) -> TouristDirectory
    where
        I: IntoIterator<Item = &'a TouristTelemetrySnapshot>,
    {
        let mut summary = TierSummary::default();
        let mut tourists = Vec::new();

        for snapshot in snapshots {
            let card = self.score_card(snapshot);
            summary.add(card.tier);
            if query.matches(&card) {
                tourists.push(card);
            }
        }

        TouristDirectory { summary, tourists }
    }
}

/// Inclusion filter for the at-risk listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtRiskPolicy {
    /// Tourists scoring strictly below this are included.
    pub below: u8,
}

impl Default for AtRiskPolicy {
    fn default() -> Self {
        Self { below: 70 }
    }
}

impl AtRiskPolicy {
    pub fn includes(&self, score: u8) -> bool {
        score < self.below
    }

    /// Keep the included items and order them by score ascending.
    /// Ties keep input order.
    pub fn filter_sorted<T, F>(&self, items: Vec<T>, score: F) -> Vec<T>
    where
        F: Fn(&T) -> u8,
    {
        let mut kept: Vec<T> = items
            .into_iter()
            .filter(|item| self.includes(score(item)))
            .collect();
        // sort_by_key is stable
        kept.sort_by_key(|item| score(item));
        kept
    }

    /// Score every snapshot and apply [`AtRiskPolicy::filter_sorted`].
    pub fn select<'a, I>(&self, snapshots: I) -> Vec<AtRiskTourist>
    where
        I: IntoIterator<Item = &'a TouristTelemetrySnapshot>,
    {
        let scored: Vec<AtRiskTourist> = snapshots
            .into_iter()
            .map(|snapshot| {
                let assessment = assess(snapshot);
                AtRiskTourist {
                    tourist_id: snapshot.id.clone(),
                    name: snapshot.name.clone(),
                    score: assessment.score,
                    factors: assessment.factors,
                }
            })
            .collect();
        self.filter_sorted(scored, |t| t.score)
    }
}
