//! Geo-fence zones.
//!
//! Authorities draw zones on the map and attach an alert message that is
//! pushed to tourists entering them. A zone is a closed polygon of
//! `[latitude, longitude]` vertices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::incident::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneType {
    Restricted,
    #[serde(rename = "High-Risk")]
    HighRisk,
    #[serde(rename = "Low Network")]
    LowNetwork,
    #[serde(rename = "Trekking Route")]
    TrekkingRoute,
}

impl ZoneType {
    pub const ALL: [ZoneType; 4] = [
        ZoneType::Restricted,
        ZoneType::HighRisk,
        ZoneType::LowNetwork,
        ZoneType::TrekkingRoute,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ZoneType::Restricted => "Restricted",
            ZoneType::HighRisk => "High-Risk",
            ZoneType::LowNetwork => "Low Network",
            ZoneType::TrekkingRoute => "Trekking Route",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == value)
    }
}

/// Create and update payload for a zone.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub severity: Severity,
    pub alert_message: String,
    pub positions: Vec<[f64; 2]>,
}

impl ZoneRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "is required"));
        }
        if self.alert_message.trim().is_empty() {
            return Err(Error::validation("alert_message", "is required"));
        }
        if self.positions.len() < 3 {
            return Err(Error::validation(
                "positions",
                "a zone needs at least three vertices",
            ));
        }
        for [lat, lng] in &self.positions {
            if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lng) {
                return Err(Error::validation(
                    "positions",
                    format!("vertex ({}, {}) is out of range", lat, lng),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoFence {
    /// e.g. "ZONE-1A2B3C4D".
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub severity: Severity,
    pub alert_message: String,
    pub positions: Vec<[f64; 2]>,
    /// User id of the authority that drew the zone.
    pub created_by: String,
    pub last_modified: DateTime<Utc>,
}

impl GeoFence {
    pub fn create(
        id: String,
        request: ZoneRequest,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        request.validate()?;

        Ok(Self {
            id,
            name: request.name.trim().to_string(),
            zone_type: request.zone_type,
            severity: request.severity,
            alert_message: request.alert_message.trim().to_string(),
            positions: request.positions,
            created_by: created_by.to_string(),
            last_modified: now,
        })
    }

    /// Replace the editable fields. `id` and `created_by` never change.
    pub fn update(&mut self, request: ZoneRequest, now: DateTime<Utc>) -> Result<()> {
        request.validate()?;

        self.name = request.name.trim().to_string();
        self.zone_type = request.zone_type;
        self.severity = request.severity;
        self.alert_message = request.alert_message.trim().to_string();
        self.positions = request.positions;
        self.last_modified = now;
        Ok(())
    }

    /// Even-odd ray casting on the raw coordinates.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let points = &self.positions;
        let mut inside = false;
        let mut j = points.len().wrapping_sub(1);

        for i in 0..points.len() {
            let [yi, xi] = points[i];
            let [yj, xj] = points[j];
            if (yi > latitude) != (yj > latitude)
                && longitude < (xj - xi) * (latitude - yi) / (yj - yi) + xi
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }
}

/// Query string for GET /zones/containing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ZoneRequest {
        ZoneRequest {
            name: "Pangong Tso Restricted Zone".into(),
            zone_type: ZoneType::Restricted,
            severity: Severity::Critical,
            alert_message: "Sensitive border area. Turn back immediately.".into(),
            positions: vec![[33.75, 78.66], [33.76, 78.68], [33.74, 78.70], [33.73, 78.67]],
        }
    }

    #[test]
    fn test_create_records_author() {
        let zone = GeoFence::create("ZONE-1".into(), request(), "admin001", Utc::now()).unwrap();
        assert_eq!(zone.created_by, "admin001");
        assert_eq!(zone.zone_type, ZoneType::Restricted);
    }

    #[test]
    fn test_validation_rejects_degenerate_zones() {
        let mut r = request();
        r.positions.truncate(2);
        assert!(matches!(
            r.validate(),
            Err(Error::Validation {
                field: "positions",
                ..
            })
        ));

        let mut r = request();
        r.positions[0] = [95.0, 78.0];
        assert!(r.validate().is_err());

        let mut r = request();
        r.alert_message = " ".into();
        assert!(matches!(
            r.validate(),
            Err(Error::Validation {
                field: "alert_message",
                ..
            })
        ));
    }

    #[test]
    fn test_update_keeps_identity() {
        let created = Utc::now();
        let mut zone = GeoFence::create("ZONE-1".into(), request(), "admin001", created).unwrap();

        let mut r = request();
        r.name = "Pangong Tso Buffer".into();
        r.zone_type = ZoneType::HighRisk;
        let later = created + chrono::Duration::minutes(5);
        zone.update(r, later).unwrap();

        assert_eq!(zone.id, "ZONE-1");
        assert_eq!(zone.created_by, "admin001");
        assert_eq!(zone.name, "Pangong Tso Buffer");
        assert_eq!(zone.last_modified, later);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let mut zone = GeoFence::create("ZONE-1".into(), request(), "admin001", Utc::now()).unwrap();
        let before = zone.clone();

        let mut r = request();
        r.name = String::new();
        assert!(zone.update(r, Utc::now()).is_err());
        assert_eq!(zone, before);
    }

    #[test]
    fn test_contains_point() {
        let zone = GeoFence::create("ZONE-1".into(), request(), "admin001", Utc::now()).unwrap();
        assert!(zone.contains(33.75, 78.68));
        assert!(!zone.contains(29.53, 78.77));
    }

    #[test]
    fn test_zone_type_wire_names() {
        for t in ZoneType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), t.label());
            assert_eq!(ZoneType::parse(t.label()), Some(t));
        }
    }
}
