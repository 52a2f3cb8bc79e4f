//! Data models for tourist telemetry and risk assessment.
//!
//! A [`TouristTelemetrySnapshot`] is the latest safety-relevant state reported
//! for one tourist. It is read-only input to the scoring functions in
//! [`crate::risk`]; a [`RiskAssessment`] is always derived from it on read and
//! never stored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Network signal quality reported by the tourist's device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalQuality {
    None,
    Poor,
    Moderate,
    Strong,
    Good,
}

impl SignalQuality {
    pub fn label(&self) -> &'static str {
        match self {
            SignalQuality::None => "None",
            SignalQuality::Poor => "Poor",
            SignalQuality::Moderate => "Moderate",
            SignalQuality::Strong => "Strong",
            SignalQuality::Good => "Good",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "None" => Some(SignalQuality::None),
            "Poor" => Some(SignalQuality::Poor),
            "Moderate" => Some(SignalQuality::Moderate),
            "Strong" => Some(SignalQuality::Strong),
            "Good" => Some(SignalQuality::Good),
            _ => None,
        }
    }
}

/// One tourist's current safety-relevant state.
///
/// Supplied by the telemetry source. Nothing in this crate mutates a
/// snapshot once it has been accepted; a newer snapshot replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouristTelemetrySnapshot {
    /// Tourist identifier, e.g. "T-78B".
    pub id: String,

    /// Display name.
    pub name: String,

    /// Battery level in percent, 0 to 100.
    pub battery_level: u8,

    /// Network signal quality.
    pub signal: SignalQuality,

    pub near_high_risk_zone: bool,

    pub hiking_after_sunset: bool,

    pub deviated_from_itinerary: bool,
}

impl TouristTelemetrySnapshot {
    /// Check the snapshot invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("id", "is required"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "is required"));
        }
        if self.battery_level > 100 {
            return Err(Error::validation(
                "battery_level",
                format!("must be between 0 and 100, got {}", self.battery_level),
            ));
        }
        Ok(())
    }
}

/// A named boolean condition that deducts a fixed amount from the safety score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    #[serde(rename = "Nearing High-Risk Zone")]
    NearHighRiskZone,
    #[serde(rename = "Itinerary Deviation")]
    ItineraryDeviation,
    #[serde(rename = "Active After Sunset")]
    ActiveAfterSunset,
    #[serde(rename = "Low Device Battery")]
    LowDeviceBattery,
    #[serde(rename = "No Network Signal")]
    NoNetworkSignal,
}

impl RiskFactor {
    /// All factors, in evaluation order.
    pub const ALL: [RiskFactor; 5] = [
        RiskFactor::NearHighRiskZone,
        RiskFactor::ItineraryDeviation,
        RiskFactor::ActiveAfterSunset,
        RiskFactor::LowDeviceBattery,
        RiskFactor::NoNetworkSignal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::NearHighRiskZone => "Nearing High-Risk Zone",
            RiskFactor::ItineraryDeviation => "Itinerary Deviation",
            RiskFactor::ActiveAfterSunset => "Active After Sunset",
            RiskFactor::LowDeviceBattery => "Low Device Battery",
            RiskFactor::NoNetworkSignal => "No Network Signal",
        }
    }

    /// Points deducted from the base score of 100.
    pub fn deduction(&self) -> u8 {
        match self {
            RiskFactor::NearHighRiskZone => 25,
            RiskFactor::ItineraryDeviation => 20,
            RiskFactor::ActiveAfterSunset => 30,
            RiskFactor::LowDeviceBattery => 15,
            RiskFactor::NoNetworkSignal => 10,
        }
    }

    /// Whether this factor is triggered by the snapshot.
    pub fn is_triggered(&self, snapshot: &TouristTelemetrySnapshot) -> bool {
        match self {
            RiskFactor::NearHighRiskZone => snapshot.near_high_risk_zone,
            RiskFactor::ItineraryDeviation => snapshot.deviated_from_itinerary,
            RiskFactor::ActiveAfterSunset => snapshot.hiking_after_sunset,
            RiskFactor::LowDeviceBattery => snapshot.battery_level < 20,
            RiskFactor::NoNetworkSignal => snapshot.signal == SignalQuality::None,
        }
    }
}

/// Risk factors and score derived from one snapshot.
///
/// `factors` keeps evaluation order; `score` is in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub factors: Vec<RiskFactor>,
    pub score: u8,
}

/// Display tier for safety-score cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Safe,
    Caution,
    Danger,
}

impl ScoreTier {
    /// Color bucket used by the score cards.
    pub fn color(&self) -> &'static str {
        match self {
            ScoreTier::Safe => "emerald",
            ScoreTier::Caution => "amber",
            ScoreTier::Danger => "red",
        }
    }
}

/// Response for GET /tourists/:id/assessment.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentResponse {
    pub tourist_id: String,
    pub name: String,
    pub score: u8,
    pub factors: Vec<RiskFactor>,
    pub tier: ScoreTier,
    pub color: &'static str,
}

/// One entry of the at-risk listing.
#[derive(Debug, Clone, Serialize)]
pub struct AtRiskTourist {
    pub tourist_id: String,
    pub name: String,
    pub score: u8,
    pub factors: Vec<RiskFactor>,
}

/// Response for GET /tourists/at-risk.
#[derive(Debug, Clone, Serialize)]
pub struct AtRiskResponse {
    /// Tourists scoring below this value are listed.
    pub threshold: u8,
    /// Most at risk first.
    pub tourists: Vec<AtRiskTourist>,
}

/// Query string for GET /tourists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryQuery {
    /// Only tourists in this tier.
    pub tier: Option<ScoreTier>,
    /// Case-insensitive match on name or id.
    pub search: Option<String>,
}

impl DirectoryQuery {
    pub fn matches(&self, card: &AssessmentResponse) -> bool {
        if self.tier.is_some_and(|tier| tier != card.tier) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                card.name.to_lowercase().contains(&term)
                    || card.tourist_id.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

/// Tier counts over every known tourist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierSummary {
    pub total: usize,
    pub safe: usize,
    pub caution: usize,
    pub danger: usize,
}

impl TierSummary {
    pub fn add(&mut self, tier: ScoreTier) {
        self.total += 1;
        match tier {
            ScoreTier::Safe => self.safe += 1,
            ScoreTier::Caution => self.caution += 1,
            ScoreTier::Danger => self.danger += 1,
        }
    }
}

/// Response for GET /tourists.
#[derive(Debug, Clone, Serialize)]
pub struct TouristDirectory {
    /// Unfiltered.
    pub summary: TierSummary,
    /// Filtered, in first-seen order.
    pub tourists: Vec<AssessmentResponse>,
}

/// Request body for PUT /tourists/:id.
///
/// The identifier comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryRequest {
    pub name: String,
    pub battery_level: u8,
    pub signal: SignalQuality,
    #[serde(default)]
    pub near_high_risk_zone: bool,
    #[serde(default)]
    pub hiking_after_sunset: bool,
    #[serde(default)]
    pub deviated_from_itinerary: bool,
}

impl TelemetryRequest {
    pub fn into_snapshot(self, id: String) -> TouristTelemetrySnapshot {
        TouristTelemetrySnapshot {
            id,
            name: self.name,
            battery_level: self.battery_level,
            signal: self.signal,
            near_high_risk_zone: self.near_high_risk_zone,
            hiking_after_sunset: self.hiking_after_sunset,
            deviated_from_itinerary: self.deviated_from_itinerary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TouristTelemetrySnapshot {
        TouristTelemetrySnapshot {
            id: "T-12C".to_string(),
            name: "Ankit Verma".to_string(),
            battery_level: 80,
            signal: SignalQuality::Good,
            near_high_risk_zone: false,
            hiking_after_sunset: false,
            deviated_from_itinerary: false,
        }
    }

    #[test]
    fn test_validate_accepts_bounds() {
        let mut s = snapshot();
        s.battery_level = 0;
        assert!(s.validate().is_ok());
        s.battery_level = 100;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_battery_over_100() {
        let mut s = snapshot();
        s.battery_level = 101;
        match s.validate() {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "battery_level"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let mut s = snapshot();
        s.name = "  ".to_string();
        assert!(matches!(
            s.validate(),
            Err(Error::Validation { field: "name", .. })
        ));
    }

    #[test]
    fn test_battery_threshold_is_strict() {
        let mut s = snapshot();
        s.battery_level = 20;
        assert!(!RiskFactor::LowDeviceBattery.is_triggered(&s));
        s.battery_level = 19;
        assert!(RiskFactor::LowDeviceBattery.is_triggered(&s));
    }

    #[test]
    fn test_only_none_signal_triggers() {
        let mut s = snapshot();
        for signal in [
            SignalQuality::Poor,
            SignalQuality::Moderate,
            SignalQuality::Strong,
            SignalQuality::Good,
        ] {
            s.signal = signal;
            assert!(!RiskFactor::NoNetworkSignal.is_triggered(&s));
        }
        s.signal = SignalQuality::None;
        assert!(RiskFactor::NoNetworkSignal.is_triggered(&s));
    }

    #[test]
    fn test_factor_serializes_as_label() {
        for factor in RiskFactor::ALL {
            let json = serde_json::to_value(factor).unwrap();
            assert_eq!(json, factor.label());
        }
    }

    #[test]
    fn test_signal_parse_matches_label() {
        assert_eq!(SignalQuality::parse("Strong"), Some(SignalQuality::Strong));
        assert_eq!(SignalQuality::parse("Lost"), None);
        assert_eq!(SignalQuality::None.label(), "None");
    }

    #[test]
    fn test_tier_colors() {
        assert_eq!(ScoreTier::Safe.color(), "emerald");
        assert_eq!(ScoreTier::Caution.color(), "amber");
        assert_eq!(ScoreTier::Danger.color(), "red");
    }

    #[test]
    fn test_summary_counts_each_tier() {
        let mut summary = TierSummary::default();
        for tier in [ScoreTier::Safe, ScoreTier::Danger, ScoreTier::Safe] {
            summary.add(tier);
        }
        assert_eq!(
            summary,
            TierSummary {
                total: 3,
                safe: 2,
                caution: 0,
                danger: 1
            }
        );
    }

    #[test]
    fn test_directory_query_matching() {
        let card = AssessmentResponse {
            tourist_id: "T-45A".into(),
            name: "Priya Patel".into(),
            score: 55,
            factors: vec![RiskFactor::ActiveAfterSunset],
            tier: ScoreTier::Caution,
            color: "amber",
        };

        assert!(DirectoryQuery::default().matches(&card));
        let by_name = DirectoryQuery {
            tier: None,
            search: Some("priya".into()),
        };
        assert!(by_name.matches(&card));
        let by_id = DirectoryQuery {
            tier: Some(ScoreTier::Caution),
            search: Some("t-45".into()),
        };
        assert!(by_id.matches(&card));
        let wrong_tier = DirectoryQuery {
            tier: Some(ScoreTier::Danger),
            search: None,
        };
        assert!(!wrong_tier.matches(&card));
        let no_match = DirectoryQuery {
            tier: None,
            search: Some("rohan".into()),
        };
        assert!(!no_match.matches(&card));
    }
}
