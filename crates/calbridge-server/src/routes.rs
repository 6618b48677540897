//! REST endpoints bridging HTTP requests onto the calendar API.
//!
//! Each handler obtains a credential from the authorizer, issues exactly
//! one calendar API call, and maps the outcome into the
//! `{success, message, data?}` envelope. Nothing is retried here.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use calbridge_google::calendar::{
    Attendee, CalendarClient, ConferenceData, EventDateTime, EventPayload, Reminders,
};
use calbridge_google::{AuthError, ErrorKind, GoogleError};

use crate::state::AppState;

/// Builds the calendar route set.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/calendar/add_event", post(add_event))
        .route("/api/calendar/update_event", post(update_event))
        .route("/api/calendar/delete_event", post(delete_event))
        .route("/api/calendar/get_event_list", get(get_event_list))
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// A failed bridge request, carrying enough to pick a status code.
#[derive(Debug)]
pub enum BridgeError {
    /// Authorization failed; the request is unauthenticated.
    Auth(AuthError),
    /// The calendar API call failed.
    Api(GoogleError),
    /// The request body was unusable.
    BadRequest(String),
}

impl From<AuthError> for BridgeError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<GoogleError> for BridgeError {
    fn from(err: GoogleError) -> Self {
        Self::Api(err)
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Auth(e) => {
                error!("authorization failed: {e}");
                (StatusCode::UNAUTHORIZED, format!("not authorized: {e}"))
            }
            Self::Api(e) => {
                error!("calendar API call failed: {e}");
                (status_for(e.kind()), e.to_string())
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };

        (status, Json(ApiResponse::fail(message))).into_response()
    }
}

/// Maps an API error kind onto an HTTP status.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        ErrorKind::AuthorizationFailed => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::BadRequest | ErrorKind::InvalidResponse => StatusCode::BAD_REQUEST,
        ErrorKind::NetworkError | ErrorKind::ServerError => StatusCode::BAD_GATEWAY,
        ErrorKind::ConfigurationError | ErrorKind::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Body accepted by add_event and update_event, field names as upstream
/// clients send them.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub summary: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub timezone: Option<String>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Required for update_event, ignored by add_event.
    pub event_id: Option<String>,
}

/// Body accepted by delete_event.
#[derive(Debug, Deserialize)]
pub struct DeleteEventRequest {
    pub event_id: String,
}

/// Shapes the API event body the way the bridge always sends it: a Meet
/// conference request and the fixed reminder set.
fn event_payload(req: &EventRequest) -> EventPayload {
    EventPayload {
        summary: req.summary.clone(),
        location: req.location.clone(),
        description: req.description.clone(),
        start: EventDateTime::new(req.start_date.clone(), req.timezone.clone()),
        end: EventDateTime::new(req.end_date.clone(), req.timezone.clone()),
        conference_data: ConferenceData::meet_request(),
        attendees: req.attendees.clone(),
        reminders: Reminders::standard(),
    }
}

/// Authorizes and builds the per-request calendar client.
async fn calendar_for(state: &AppState) -> Result<CalendarClient, BridgeError> {
    let credential = state.authorizer.authorize().await?;
    Ok(CalendarClient::new(credential, state.config.api_timeout))
}

/// POST /api/calendar/add_event
async fn add_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), BridgeError> {
    let calendar = calendar_for(&state).await?;
    let created = calendar
        .insert_event(&state.config.calendar_id, &event_payload(&req))
        .await?;

    info!(
        "created event {}",
        created.id.as_deref().unwrap_or("<unknown>")
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::ok("Event created"))))
}

/// POST /api/calendar/update_event
async fn update_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), BridgeError> {
    let event_id = req
        .event_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BridgeError::BadRequest("event_id is required".to_string()))?
        .to_string();

    let calendar = calendar_for(&state).await?;
    calendar
        .update_event(&state.config.calendar_id, &event_id, &event_payload(&req))
        .await?;

    info!("updated event {event_id}");
    Ok((StatusCode::OK, Json(ApiResponse::ok("Event updated"))))
}

/// POST /api/calendar/delete_event
async fn delete_event(
    State(state): State<AppState>,
    Json(req): Json<DeleteEventRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), BridgeError> {
    let calendar = calendar_for(&state).await?;
    calendar
        .delete_event(&state.config.calendar_id, &req.event_id)
        .await?;

    info!("deleted event {}", req.event_id);
    Ok((StatusCode::OK, Json(ApiResponse::ok("Event deleted"))))
}

/// GET /api/calendar/get_event_list
async fn get_event_list(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse>), BridgeError> {
    let calendar = calendar_for(&state).await?;
    let events = calendar
        .list_events(&state.config.calendar_id, state.config.list_max_results)
        .await?;

    if events.is_empty() {
        return Ok((StatusCode::OK, Json(ApiResponse::ok("no events found"))));
    }

    info!("listed {} events", events.len());
    Ok((
        StatusCode::OK,
        Json(ApiResponse::ok_with("success", Value::Array(events))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_data() {
        let json = serde_json::to_value(ApiResponse::ok("Event created")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Event created");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn envelope_includes_data_when_present() {
        let data = serde_json::json!([{"id": "evt1"}]);
        let json = serde_json::to_value(ApiResponse::ok_with("success", data)).unwrap();
        assert_eq!(json["data"][0]["id"], "evt1");
    }

    #[test]
    fn envelope_failure_shape() {
        let json = serde_json::to_value(ApiResponse::fail("not authorized")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "not authorized");
    }

    #[test]
    fn event_request_parses_client_body() {
        let body = r#"{
            "summary": "Standup",
            "location": "Room 2",
            "description": "Daily sync",
            "start_date": "2026-03-15T10:00:00+01:00",
            "end_date": "2026-03-15T10:15:00+01:00",
            "timezone": "Europe/Paris",
            "attendees": [{"email": "a@example.com"}],
            "event_id": "evt42"
        }"#;

        let req: EventRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.summary.as_deref(), Some("Standup"));
        assert_eq!(req.attendees.len(), 1);
        assert_eq!(req.event_id.as_deref(), Some("evt42"));
    }

    #[test]
    fn event_request_minimal_body() {
        let body = r#"{
            "start_date": "2026-03-15T10:00:00Z",
            "end_date": "2026-03-15T11:00:00Z"
        }"#;

        let req: EventRequest = serde_json::from_str(body).unwrap();
        assert!(req.summary.is_none());
        assert!(req.attendees.is_empty());
        assert!(req.event_id.is_none());
    }

    #[test]
    fn payload_carries_request_fields() {
        let req: EventRequest = serde_json::from_str(
            r#"{
                "summary": "Standup",
                "start_date": "2026-03-15T10:00:00Z",
                "end_date": "2026-03-15T11:00:00Z",
                "timezone": "UTC"
            }"#,
        )
        .unwrap();

        let json = serde_json::to_value(event_payload(&req)).unwrap();
        assert_eq!(json["summary"], "Standup");
        assert_eq!(json["start"]["dateTime"], "2026-03-15T10:00:00Z");
        assert_eq!(json["end"]["timeZone"], "UTC");
        assert_eq!(
            json["conferenceData"]["createRequest"]["conferenceSolutionKey"]["type"],
            "hangoutsMeet"
        );
        assert_eq!(json["reminders"]["useDefault"], false);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(ErrorKind::AuthenticationFailed),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_for(ErrorKind::NetworkError), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn delete_request_requires_event_id() {
        let ok: DeleteEventRequest = serde_json::from_str(r#"{"event_id": "evt1"}"#).unwrap();
        assert_eq!(ok.event_id, "evt1");

        let missing = serde_json::from_str::<DeleteEventRequest>("{}");
        assert!(missing.is_err());
    }
}
