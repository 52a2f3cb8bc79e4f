//! Incidents and their two response workflows.
//!
//! An incident is tracked on two independent state machines that serve two
//! different operator surfaces:
//!
//! - [`BoardStatus`]: the kanban board (New, Investigating, Dispatched, Resolved).
//! - [`ResponseStage`]: the response stepper (Acknowledged, Team Assigned,
//!   En Route, On-Site, Resolved).
//!
//! Both implement [`Workflow`]. Legal moves are listed explicitly per state
//! and only ever go forward; anything else is rejected with
//! [`Error::InvalidTransition`].
//!
//! The incident log is append-only. Every operation validates before it
//! mutates, so a rejected operation leaves the incident exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A fixed, ordered state machine.
pub trait Workflow: Copy + Eq + std::fmt::Debug + Sized + 'static {
    /// Every state, in workflow order.
    const STATES: &'static [Self];

    /// Display label, used in log messages.
    fn label(&self) -> &'static str;

    /// Stable storage key.
    fn key(&self) -> &'static str;

    /// States reachable in one move.
    fn next_states(&self) -> &'static [Self];

    fn from_key(key: &str) -> Option<Self> {
        Self::STATES.iter().copied().find(|s| s.key() == key)
    }

    fn can_transition_to(&self, next: Self) -> bool {
        self.next_states().contains(&next)
    }

    fn check_transition(&self, next: Self) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

/// Incident severity. Ordered so that `Critical` is the greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// What raised the incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PanicButton,
    AiAnomaly,
    DeviceOffline,
    GeoFenceBreach,
}

impl AlertType {
    pub fn label(&self) -> &'static str {
        match self {
            AlertType::PanicButton => "Panic Button",
            AlertType::AiAnomaly => "AI Anomaly Detected",
            AlertType::DeviceOffline => "Device Offline",
            AlertType::GeoFenceBreach => "Geo-Fence Breach",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            AlertType::PanicButton => "panic_button",
            AlertType::AiAnomaly => "ai_anomaly",
            AlertType::DeviceOffline => "device_offline",
            AlertType::GeoFenceBreach => "geo_fence_breach",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "panic_button" => Some(AlertType::PanicButton),
            "ai_anomaly" => Some(AlertType::AiAnomaly),
            "device_offline" => Some(AlertType::DeviceOffline),
            "geo_fence_breach" => Some(AlertType::GeoFenceBreach),
            _ => None,
        }
    }
}

/// Kanban board column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    New,
    Investigating,
    Dispatched,
    Resolved,
}

impl Workflow for BoardStatus {
    const STATES: &'static [Self] = &[
        BoardStatus::New,
        BoardStatus::Investigating,
        BoardStatus::Dispatched,
        BoardStatus::Resolved,
    ];

    fn label(&self) -> &'static str {
        match self {
            BoardStatus::New => "New Alerts",
            BoardStatus::Investigating => "Under Investigation",
            BoardStatus::Dispatched => "Action Dispatched",
            BoardStatus::Resolved => "Resolved",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            BoardStatus::New => "new",
            BoardStatus::Investigating => "investigating",
            BoardStatus::Dispatched => "dispatched",
            BoardStatus::Resolved => "resolved",
        }
    }

    fn next_states(&self) -> &'static [Self] {
        match self {
            BoardStatus::New => &[
                BoardStatus::Investigating,
                BoardStatus::Dispatched,
                BoardStatus::Resolved,
            ],
            BoardStatus::Investigating => &[BoardStatus::Dispatched, BoardStatus::Resolved],
            BoardStatus::Dispatched => &[BoardStatus::Resolved],
            BoardStatus::Resolved => &[],
        }
    }
}

/// Response stepper stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStage {
    Acknowledged,
    TeamAssigned,
    EnRoute,
    OnSite,
    Resolved,
}

impl Workflow for ResponseStage {
    const STATES: &'static [Self] = &[
        ResponseStage::Acknowledged,
        ResponseStage::TeamAssigned,
        ResponseStage::EnRoute,
        ResponseStage::OnSite,
        ResponseStage::Resolved,
    ];

    fn label(&self) -> &'static str {
        match self {
            ResponseStage::Acknowledged => "Acknowledged",
            ResponseStage::TeamAssigned => "Team Assigned",
            ResponseStage::EnRoute => "En Route",
            ResponseStage::OnSite => "On-Site",
            ResponseStage::Resolved => "Resolved",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            ResponseStage::Acknowledged => "acknowledged",
            ResponseStage::TeamAssigned => "team_assigned",
            ResponseStage::EnRoute => "en_route",
            ResponseStage::OnSite => "on_site",
            ResponseStage::Resolved => "resolved",
        }
    }

    fn next_states(&self) -> &'static [Self] {
        match self {
            ResponseStage::Acknowledged => &[
                ResponseStage::TeamAssigned,
                ResponseStage::EnRoute,
                ResponseStage::OnSite,
                ResponseStage::Resolved,
            ],
            ResponseStage::TeamAssigned => &[
                ResponseStage::EnRoute,
                ResponseStage::OnSite,
                ResponseStage::Resolved,
            ],
            ResponseStage::EnRoute => &[ResponseStage::OnSite, ResponseStage::Resolved],
            ResponseStage::OnSite => &[ResponseStage::Resolved],
            ResponseStage::Resolved => &[],
        }
    }
}

/// Author of a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    /// An operator, by user id.
    Operator(String),
}

impl Actor {
    /// Encode for storage: `system` or `operator:<user id>`.
    pub fn encode(&self) -> String {
        match self {
            Actor::System => "system".to_string(),
            Actor::Operator(user) => format!("operator:{}", user),
        }
    }

    pub fn decode(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Actor::System),
            other => other
                .strip_prefix("operator:")
                .map(|user| Actor::Operator(user.to_string())),
        }
    }
}

/// One irrevocable entry of the incident log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub actor: Actor,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Alert ingestion payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIncident {
    pub tourist_id: String,
    pub tourist_name: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub location: String,
    #[serde(default)]
    pub details: String,
}

impl NewIncident {
    pub fn validate(&self) -> Result<()> {
        if self.tourist_id.trim().is_empty() {
            return Err(Error::validation("tourist_id", "is required"));
        }
        if self.tourist_name.trim().is_empty() {
            return Err(Error::validation("tourist_name", "is required"));
        }
        if self.location.trim().is_empty() {
            return Err(Error::validation("location", "is required"));
        }
        Ok(())
    }
}

/// A tracked safety event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// e.g. "INC-3F9A21C0".
    pub id: String,

    /// Lookup reference only; the tourist record is not owned here.
    pub tourist_id: String,

    pub tourist_name: String,

    pub alert_type: AlertType,

    pub severity: Severity,

    /// Free-text location.
    pub location: String,

    pub details: String,

    pub created_at: DateTime<Utc>,

    pub status: BoardStatus,

    pub stage: ResponseStage,

    pub assigned_team: Option<String>,

    /// Append-only.
    pub log: Vec<LogEntry>,
}

impl Incident {
    /// Open an incident from an ingested alert.
    pub fn open(id: String, alert: NewIncident, now: DateTime<Utc>) -> Result<Self> {
        alert.validate()?;

        let opened = LogEntry {
            actor: Actor::System,
            message: format!("Incident opened: {}.", alert.alert_type.label()),
            timestamp: now,
        };

        Ok(Self {
            id,
            tourist_id: alert.tourist_id,
            tourist_name: alert.tourist_name,
            alert_type: alert.alert_type,
            severity: alert.severity,
            location: alert.location,
            details: alert.details,
            created_at: now,
            status: BoardStatus::New,
            stage: ResponseStage::Acknowledged,
            assigned_team: None,
            log: vec![opened],
        })
    }

    /// Move the incident to another board column.
    pub fn move_to(&mut self, status: BoardStatus, at: DateTime<Utc>) -> Result<()> {
        self.status.check_transition(status)?;

        self.status = status;
        self.log.push(LogEntry {
            actor: Actor::System,
            message: format!("Status changed to {}.", status.label()),
            timestamp: at,
        });
        Ok(())
    }

    /// Advance the response stepper.
    ///
    /// Moving to [`ResponseStage::TeamAssigned`] requires a team name.
    pub fn advance_stage(
        &mut self,
        stage: ResponseStage,
        team: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.stage.check_transition(stage)?;

        let team = team
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if stage == ResponseStage::TeamAssigned && team.is_none() {
            return Err(Error::validation("team", "is required to assign a team"));
        }

        let mut message = format!("Stage changed to {}.", stage.label());
        if let Some(team) = team {
            message.push_str(&format!(" Team: {}.", team));
            self.assigned_team = Some(team);
        }

        self.stage = stage;
        self.log.push(LogEntry {
            actor: Actor::System,
            message,
            timestamp: at,
        });
        Ok(())
    }

    /// Append a note. The status is untouched.
    pub fn add_note(&mut self, actor: Actor, text: &str, at: DateTime<Utc>) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("text", "note must not be empty"));
        }

        self.log.push(LogEntry {
            actor,
            message: text.to_string(),
            timestamp: at,
        });
        Ok(())
    }
}

/// Sort for listing: most severe first, then newest first.
pub fn sort_for_listing(incidents: &mut [Incident]) {
    incidents.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// One column of the board.
#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub status: BoardStatus,
    pub label: &'static str,
    pub incidents: Vec<Incident>,
}

/// Group incidents into board columns, in workflow order.
///
/// Every column is present, even when empty.
pub fn board(incidents: Vec<Incident>) -> Vec<BoardColumn> {
    let mut columns: Vec<BoardColumn> = BoardStatus::STATES
        .iter()
        .map(|status| BoardColumn {
            status: *status,
            label: status.label(),
            incidents: Vec::new(),
        })
        .collect();

    for incident in incidents {
        if let Some(column) = columns.iter_mut().find(|c| c.status == incident.status) {
            column.incidents.push(incident);
        }
    }

    columns
}

/// Request body for POST /incidents/:id/status.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub status: BoardStatus,
}

/// Request body for POST /incidents/:id/stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageRequest {
    pub stage: ResponseStage,
    #[serde(default)]
    pub team: Option<String>,
}

/// Request body for POST /incidents/:id/notes.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteRequest {
    pub text: String,
}
