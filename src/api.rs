//! HTTP API handlers.
//!
//! Every handler that touches tourist or incident data resolves a session
//! first; see [`crate::auth::SessionStore::authorize`]. Request bodies,
//! headers and tokens are skipped from tracing spans so credentials never
//! reach the logs.
//!
//! Errors are returned as `(StatusCode, Json<ErrorResponse>)`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    Authenticator, CredentialTable, LoginRequest, Role, SessionStore, SignupForm, bearer_token,
};
use crate::config::Config;
use crate::error::{self, Error, ErrorResponse};
use crate::incident::{
    self, BoardColumn, Incident, NewIncident, NoteRequest, StageRequest, StatusRequest, Workflow,
};
use crate::model::{
    AssessmentResponse, AtRiskResponse, DirectoryQuery, TelemetryRequest, TouristDirectory,
};
use crate::protocol::{self, ResponseProtocol};
use crate::report::{Channel, Dispatcher, EmergencyReport, EmergencyRequest};
use crate::risk::{AtRiskPolicy, TierPolicy};
use crate::storage::Storage;
use crate::zone::{GeoFence, PointQuery, ZoneRequest};

type Rejection = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub sessions: Arc<SessionStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub dispatcher: Dispatcher,
    pub report_channel: Channel,
    pub tiers: TierPolicy,
    pub at_risk: AtRiskPolicy,
}

impl AppState {
    pub fn new(storage: Storage, config: &Config) -> error::Result<Self> {
        let dispatcher = match &config.report_webhook {
            Some(url) => Dispatcher::webhook(url, config.report_timeout)?,
            None => Dispatcher::Log,
        };

        Ok(Self {
            storage,
            sessions: Arc::new(SessionStore::with_ttl(config.session_ttl)),
            authenticator: Arc::new(CredentialTable::new(
                config.tourist.clone(),
                config.authority.clone(),
            )),
            dispatcher,
            report_channel: Channel::Email {
                to: config.report_email.clone(),
            },
            tiers: config.tiers,
            at_risk: config.at_risk,
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(post_login))
        .route("/auth/logout", post(post_logout))
        .route("/auth/signup", post(post_signup))
        .route("/tourists", get(get_tourists))
        .route("/tourists/at-risk", get(get_at_risk))
        .route("/tourists/:id", put(put_tourist))
        .route("/tourists/:id/assessment", get(get_assessment))
        .route("/incidents", post(post_incident).get(get_incidents))
        .route("/incidents/board", get(get_board))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/status", post(post_status))
        .route("/incidents/:id/stage", post(post_stage))
        .route("/incidents/:id/notes", post(post_note))
        .route("/incidents/:id/protocol", get(get_protocol))
        .route("/zones", post(post_zone).get(get_zones))
        .route("/zones/containing", get(get_zones_containing))
        .route(
            "/zones/:id",
            get(get_zone).put(put_zone).delete(delete_zone),
        )
        .route("/emergency", post(post_emergency))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Log a failed request and turn the error into a response.
fn fail(action: &'static str, e: Error) -> Rejection {
    match &e {
        Error::Storage(_) | Error::Dispatch(_) => warn!(action, error = %e, "Request failed"),
        _ => info!(action, error = %e, "Request rejected"),
    }
    e.reject()
}

fn not_found(kind: &'static str, id: &str) -> Error {
    Error::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

/// POST /auth/login - Exchange role and credentials for a session token.
#[instrument(skip(state, request))]
pub async fn post_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let session = state
        .sessions
        .login(state.authenticator.as_ref(), &request)
        .await
        .map_err(|e| fail("login", e))?;

    info!(user_id = %session.user_id, role = session.role.as_str(), "Session opened");

    Ok(Json(LoginResponse {
        token: session.token,
        user_id: session.user_id,
        role: session.role,
    }))
}

/// POST /auth/logout - Drop the caller's session.
#[instrument(skip(state, headers))]
pub async fn post_logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.logout(token).await;
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub registration_id: i64,
    pub status: &'static str,
}

/// POST /auth/signup - Validate and record a registration.
///
/// Registrations stay pending; nothing activates them.
#[instrument(skip(state, form))]
pub async fn post_signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<SignupResponse>), Rejection> {
    form.validate().map_err(|e| fail("signup", e))?;

    let registration = form.into_registration(Utc::now());
    let registration_id = state
        .storage
        .insert_registration(&registration)
        .await
        .map_err(|e| fail("signup", e))?;

    info!(registration_id, "Registration recorded");

    Ok((
        StatusCode::ACCEPTED,
        Json(SignupResponse {
            registration_id,
            status: "pending",
        }),
    ))
}

// ============================================================================
// Tourists
// ============================================================================

/// PUT /tourists/:id - Record the latest telemetry snapshot.
///
/// Returns the fresh assessment.
#[instrument(skip(state, headers, request))]
pub async fn put_tourist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<TelemetryRequest>,
) -> Result<Json<AssessmentResponse>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("put_tourist", e))?;

    let snapshot = request.into_snapshot(id);
    snapshot.validate().map_err(|e| fail("put_tourist", e))?;

    state
        .storage
        .upsert_tourist(&snapshot, Utc::now())
        .await
        .map_err(|e| fail("put_tourist", e))?;

    let card = state.tiers.score_card(&snapshot);

    info!(
        tourist_id = %card.tourist_id,
        score = card.score,
        tier = ?card.tier,
        "Telemetry recorded"
    );

    Ok(Json(card))
}

/// GET /tourists/:id/assessment - Score the tourist's latest snapshot.
#[instrument(skip(state, headers))]
pub async fn get_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AssessmentResponse>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_assessment", e))?;

    let snapshot = state
        .storage
        .get_tourist(&id)
        .await
        .and_then(|s| s.ok_or_else(|| not_found("tourist", &id)))
        .map_err(|e| fail("get_assessment", e))?;

    Ok(Json(state.tiers.score_card(&snapshot)))
}

/// GET /tourists - Score cards filtered by tier and search term, plus
/// tier counts over everyone.
#[instrument(skip(state, headers))]
pub async fn get_tourists(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<TouristDirectory>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_tourists", e))?;

    let tourists = state
        .storage
        .list_tourists()
        .await
        .map_err(|e| fail("get_tourists", e))?;

    Ok(Json(state.tiers.directory(&tourists, &query)))
}

/// GET /tourists/at-risk - Tourists below the at-risk threshold, most at risk first.
#[instrument(skip(state, headers))]
pub async fn get_at_risk(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AtRiskResponse>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_at_risk", e))?;

    let tourists = state
        .storage
        .list_tourists()
        .await
        .map_err(|e| fail("get_at_risk", e))?;

    let selected = state.at_risk.select(&tourists);

    info!(
        total = tourists.len(),
        at_risk = selected.len(),
        "At-risk list queried"
    );

    Ok(Json(AtRiskResponse {
        threshold: state.at_risk.below,
        tourists: selected,
    }))
}

// ============================================================================
// Incidents
// ============================================================================

fn new_incident_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("INC-{}", raw[..8].to_uppercase())
}

/// POST /incidents - Open an incident from an ingested alert.
#[instrument(skip(state, headers, alert))]
pub async fn post_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(alert): Json<NewIncident>,
) -> Result<(StatusCode, Json<Incident>), Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("post_incident", e))?;

    let incident =
        Incident::open(new_incident_id(), alert, Utc::now()).map_err(|e| fail("post_incident", e))?;

    state
        .storage
        .insert_incident(&incident)
        .await
        .map_err(|e| fail("post_incident", e))?;

    info!(
        incident_id = %incident.id,
        severity = incident.severity.label(),
        alert_type = incident.alert_type.label(),
        "Incident opened"
    );

    Ok((StatusCode::CREATED, Json(incident)))
}

/// GET /incidents - All incidents, most severe and newest first.
#[instrument(skip(state, headers))]
pub async fn get_incidents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Incident>>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_incidents", e))?;

    let mut incidents = state
        .storage
        .list_incidents()
        .await
        .map_err(|e| fail("get_incidents", e))?;
    incident::sort_for_listing(&mut incidents);

    Ok(Json(incidents))
}

/// GET /incidents/board - Incidents grouped into board columns.
#[instrument(skip(state, headers))]
pub async fn get_board(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BoardColumn>>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_board", e))?;

    let mut incidents = state
        .storage
        .list_incidents()
        .await
        .map_err(|e| fail("get_board", e))?;
    incident::sort_for_listing(&mut incidents);

    Ok(Json(incident::board(incidents)))
}

/// GET /incidents/:id - One incident with its full log.
#[instrument(skip(state, headers))]
pub async fn get_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Incident>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_incident", e))?;

    state
        .storage
        .get_incident(&id)
        .await
        .and_then(|i| i.ok_or_else(|| not_found("incident", &id)))
        .map(Json)
        .map_err(|e| fail("get_incident", e))
}

/// POST /incidents/:id/status - Move the incident on the board.
#[instrument(skip(state, headers, request))]
pub async fn post_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Incident>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("post_status", e))?;

    let incident = state
        .storage
        .update_incident(&id, |inc| inc.move_to(request.status, Utc::now()))
        .await
        .map_err(|e| fail("post_status", e))?;

    info!(incident_id = %id, status = request.status.label(), "Incident status changed");

    Ok(Json(incident))
}

/// POST /incidents/:id/stage - Advance the response stepper.
#[instrument(skip(state, headers, request))]
pub async fn post_stage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StageRequest>,
) -> Result<Json<Incident>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("post_stage", e))?;

    let stage = request.stage;
    let incident = state
        .storage
        .update_incident(&id, |inc| inc.advance_stage(stage, request.team, Utc::now()))
        .await
        .map_err(|e| fail("post_stage", e))?;

    info!(incident_id = %id, stage = stage.label(), "Incident stage changed");

    Ok(Json(incident))
}

/// POST /incidents/:id/notes - Append an operator note.
#[instrument(skip(state, headers, request))]
pub async fn post_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<NoteRequest>,
) -> Result<Json<Incident>, Rejection> {
    let session = state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("post_note", e))?;

    let actor = incident::Actor::Operator(session.user_id.clone());
    let incident = state
        .storage
        .update_incident(&id, |inc| inc.add_note(actor, &request.text, Utc::now()))
        .await
        .map_err(|e| fail("post_note", e))?;

    info!(incident_id = %id, user_id = %session.user_id, "Note added");

    Ok(Json(incident))
}

/// GET /incidents/:id/protocol - Suggested response protocol.
#[instrument(skip(state, headers))]
pub async fn get_protocol(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ResponseProtocol>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_protocol", e))?;

    let incident = state
        .storage
        .get_incident(&id)
        .await
        .and_then(|i| i.ok_or_else(|| not_found("incident", &id)))
        .map_err(|e| fail("get_protocol", e))?;

    Ok(Json(protocol::recommend(incident.alert_type)))
}

// ============================================================================
// Geo-fences
// ============================================================================

fn new_zone_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("ZONE-{}", raw[..8].to_uppercase())
}

/// POST /zones - Draw a new zone.
#[instrument(skip(state, headers, request))]
pub async fn post_zone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ZoneRequest>,
) -> Result<(StatusCode, Json<GeoFence>), Rejection> {
    let session = state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("post_zone", e))?;

    let zone = GeoFence::create(new_zone_id(), request, &session.user_id, Utc::now())
        .map_err(|e| fail("post_zone", e))?;

    state
        .storage
        .insert_zone(&zone)
        .await
        .map_err(|e| fail("post_zone", e))?;

    info!(zone_id = %zone.id, zone_type = zone.zone_type.label(), "Zone created");

    Ok((StatusCode::CREATED, Json(zone)))
}

/// GET /zones - Every zone, newest first.
#[instrument(skip(state, headers))]
pub async fn get_zones(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<GeoFence>>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_zones", e))?;

    state
        .storage
        .list_zones()
        .await
        .map(Json)
        .map_err(|e| fail("get_zones", e))
}

/// GET /zones/containing?lat=..&lng=.. - Zones the point falls inside.
#[instrument(skip(state, headers))]
pub async fn get_zones_containing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(point): Query<PointQuery>,
) -> Result<Json<Vec<GeoFence>>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_zones_containing", e))?;

    let zones = state
        .storage
        .list_zones()
        .await
        .map_err(|e| fail("get_zones_containing", e))?;

    Ok(Json(
        zones
            .into_iter()
            .filter(|z| z.contains(point.lat, point.lng))
            .collect(),
    ))
}

/// GET /zones/:id
#[instrument(skip(state, headers))]
pub async fn get_zone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<GeoFence>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("get_zone", e))?;

    state
        .storage
        .get_zone(&id)
        .await
        .and_then(|z| z.ok_or_else(|| not_found("zone", &id)))
        .map(Json)
        .map_err(|e| fail("get_zone", e))
}

/// PUT /zones/:id - Replace a zone's name, type, severity, message and shape.
#[instrument(skip(state, headers, request))]
pub async fn put_zone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ZoneRequest>,
) -> Result<Json<GeoFence>, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("put_zone", e))?;

    let mut zone = state
        .storage
        .get_zone(&id)
        .await
        .and_then(|z| z.ok_or_else(|| not_found("zone", &id)))
        .map_err(|e| fail("put_zone", e))?;

    zone.update(request, Utc::now())
        .map_err(|e| fail("put_zone", e))?;

    let updated = state
        .storage
        .update_zone(&zone)
        .await
        .map_err(|e| fail("put_zone", e))?;
    if !updated {
        // Deleted between the read and the write
        return Err(fail("put_zone", not_found("zone", &id)));
    }

    info!(zone_id = %id, "Zone updated");

    Ok(Json(zone))
}

/// DELETE /zones/:id
#[instrument(skip(state, headers))]
pub async fn delete_zone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, Rejection> {
    state
        .sessions
        .authorize(&headers, Role::Authority)
        .await
        .map_err(|e| fail("delete_zone", e))?;

    let deleted = state
        .storage
        .delete_zone(&id)
        .await
        .map_err(|e| fail("delete_zone", e))?;
    if !deleted {
        return Err(fail("delete_zone", not_found("zone", &id)));
    }

    info!(zone_id = %id, "Zone deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Emergency reports
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EmergencyResponse {
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
}

/// POST /emergency - Build an emergency report and dispatch it once.
///
/// A failed dispatch answers 502 and records nothing.
#[instrument(skip(state, headers, request))]
pub async fn post_emergency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmergencyRequest>,
) -> Result<(StatusCode, Json<EmergencyResponse>), Rejection> {
    let session = state
        .sessions
        .authorize(&headers, Role::Tourist)
        .await
        .map_err(|e| fail("post_emergency", e))?;

    let report = EmergencyReport::from_request(request, session.role, Utc::now())
        .map_err(|e| fail("post_emergency", e))?;

    state
        .dispatcher
        .dispatch(&report, &state.report_channel)
        .await
        .map_err(|e| fail("post_emergency", e))?;

    info!(user_id = %session.user_id, "Emergency report dispatched");

    Ok((
        StatusCode::ACCEPTED,
        Json(EmergencyResponse {
            delivered: true,
            timestamp: report.timestamp,
        }),
    ))
}
