//! Suggested response protocols.
//!
//! A fixed lookup from alert type to a recommended priority and checklist,
//! shown next to an incident to guide the operator.

use serde::Serialize;

use crate::incident::AlertType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseProtocol {
    pub priority: Priority,
    pub actions: Vec<&'static str>,
    pub summary: &'static str,
}

pub fn recommend(alert_type: AlertType) -> ResponseProtocol {
    match alert_type {
        AlertType::PanicButton => ResponseProtocol {
            priority: Priority::Critical,
            actions: vec![
                "Establish immediate voice contact with tourist.",
                "Advise tourist to stay put and describe surroundings.",
                "Dispatch nearest high-altitude rescue unit.",
                "Notify nearest hospital of incoming patient.",
            ],
            summary: "Direct distress signal in a potentially remote area; dispatch immediately.",
        },
        AlertType::GeoFenceBreach => ResponseProtocol {
            priority: Priority::High,
            actions: vec![
                "Send automated warning message to tourist device.",
                "Attempt non-emergency voice contact.",
                "Monitor tourist movement for 5 minutes for course correction.",
                "Put the nearest patrol unit on standby.",
            ],
            summary: "Make contact and monitor before escalating to a full dispatch.",
        },
        AlertType::AiAnomaly | AlertType::DeviceOffline => ResponseProtocol {
            priority: Priority::Medium,
            actions: vec![
                "Verify anomaly with secondary device data (e.g. heart rate).",
                "Cross-reference location with known safe zones.",
                "Log event for pattern analysis.",
            ],
            summary: "Verify the data anomaly before taking direct action.",
        },
    }
}
