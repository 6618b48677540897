//! Google Calendar API v3 gateway.
//!
//! A thin client over the events collection: insert, update, delete, and
//! list. Each instance is built from one [`Credential`] and serves the
//! single API call a request needs.

use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::authorizer::Credential;
use crate::error::{GoogleError, GoogleResult};
use crate::oauth;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Client for the events collection of one calendar API.
#[derive(Debug)]
pub struct CalendarClient {
    http_client: reqwest::Client,
    credential: Credential,
}

impl CalendarClient {
    /// Creates a client around the given credential.
    pub fn new(credential: Credential, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            credential,
        }
    }

    /// Returns a bearer token for one call.
    ///
    /// A credential fresh from consent carries its own access token; one
    /// rebuilt from the stored record exchanges its refresh token first.
    /// A stale or revoked refresh token fails here, as part of the API
    /// call that needed it.
    async fn bearer_token(&self) -> GoogleResult<String> {
        if let Some(token) = &self.credential.access_token {
            return Ok(token.clone());
        }

        let refresh_token = self.credential.refresh_token.as_deref().ok_or_else(|| {
            GoogleError::authentication("credential has neither access nor refresh token")
        })?;

        let (access_token, _expires_in) = oauth::refresh_access_token(
            &self.http_client,
            &self.credential.oauth_credentials(),
            refresh_token,
        )
        .await?;
        Ok(access_token)
    }

    /// Inserts an event, notifying attendees and provisioning the
    /// requested conference.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventPayload,
    ) -> GoogleResult<EventRef> {
        let url = format!(
            "{}/calendars/{}/events",
            CALENDAR_API_BASE,
            urlencoding::encode(calendar_id)
        );
        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .query(&[("sendUpdates", "all"), ("conferenceDataVersion", "1")])
            .json(event)
            .send()
            .await
            .map_err(request_error)?;

        let created: EventRef = Self::parse_json_response(response).await?;
        debug!(
            "created event {} in calendar {}",
            created.id.as_deref().unwrap_or("<unknown>"),
            calendar_id
        );
        Ok(created)
    }

    /// Replaces an existing event.
    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> GoogleResult<EventRef> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            CALENDAR_API_BASE,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        );
        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .put(&url)
            .bearer_auth(token)
            .query(&[("sendUpdates", "all"), ("conferenceDataVersion", "1")])
            .json(event)
            .send()
            .await
            .map_err(request_error)?;

        let updated: EventRef = Self::parse_json_response(response).await?;
        debug!("updated event {} in calendar {}", event_id, calendar_id);
        Ok(updated)
    }

    /// Deletes an event, notifying attendees.
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> GoogleResult<()> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            CALENDAR_API_BASE,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        );
        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(token)
            // sendNotifications is the legacy spelling some clients still
            // expect to see honored alongside sendUpdates.
            .query(&[("sendUpdates", "all"), ("sendNotifications", "true")])
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(response).await?;
        debug!("deleted event {} from calendar {}", event_id, calendar_id);
        Ok(())
    }

    /// Lists upcoming events, earliest first, recurring events expanded.
    ///
    /// Returns the raw API items so callers can pass them through
    /// unmodified.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        max_results: usize,
    ) -> GoogleResult<Vec<Value>> {
        let url = format!(
            "{}/calendars/{}/events",
            CALENDAR_API_BASE,
            urlencoding::encode(calendar_id)
        );
        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("timeMin", Utc::now().to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let list: EventListResponse = Self::parse_json_response(response).await?;
        debug!(
            "fetched {} events from calendar {}",
            list.items.len(),
            calendar_id
        );
        Ok(list.items)
    }

    /// Maps error statuses onto the error taxonomy, passing successes
    /// through.
    async fn check_status(response: reqwest::Response) -> GoogleResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GoogleError::authentication(
                "access token expired or invalid",
            ));
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(GoogleError::authorization("access denied to calendar"));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GoogleError::not_found("calendar or event not found"));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(GoogleError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {s} seconds"))
                    .unwrap_or_default()
            )));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(GoogleError::bad_request(format!(
                "API error ({status}): {body}"
            )))
        } else {
            Err(GoogleError::server(format!("API error ({status}): {body}")))
        }
    }

    async fn parse_json_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> GoogleResult<T> {
        let response = Self::check_status(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| GoogleError::network(format!("failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| GoogleError::invalid_response(format!("failed to parse response: {e}")))
    }
}

fn request_error(e: reqwest::Error) -> GoogleError {
    if e.is_timeout() {
        GoogleError::network("request timeout")
    } else if e.is_connect() {
        GoogleError::network(format!("connection failed: {e}"))
    } else {
        GoogleError::network(format!("request failed: {e}"))
    }
}

/// Event body sent to the API for insert and update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub conference_data: ConferenceData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    pub reminders: Reminders,
}

/// Start or end of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// Creates an event boundary from an RFC 3339 timestamp and an
    /// optional IANA timezone.
    pub fn new(date_time: impl Into<String>, time_zone: Option<String>) -> Self {
        Self {
            date_time: date_time.into(),
            time_zone,
        }
    }
}

/// Conference provisioning request attached to an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    pub create_request: CreateConferenceRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConferenceRequest {
    pub conference_solution_key: ConferenceSolutionKey,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ConferenceData {
    /// Requests a Google Meet room under a fresh idempotency key.
    pub fn meet_request() -> Self {
        Self {
            create_request: CreateConferenceRequest {
                conference_solution_key: ConferenceSolutionKey {
                    kind: "hangoutsMeet".to_string(),
                },
                request_id: Uuid::new_v4().to_string(),
            },
        }
    }
}

/// An event attendee, addressed by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
}

/// Reminder settings attached to an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

impl Reminders {
    /// The bridge's fixed reminder set: an email a day ahead and a popup
    /// ten minutes ahead.
    pub fn standard() -> Self {
        Self {
            use_default: false,
            overrides: vec![
                ReminderOverride {
                    method: "email".to_string(),
                    minutes: 24 * 60,
                },
                ReminderOverride {
                    method: "popup".to_string(),
                    minutes: 10,
                },
            ],
        }
    }
}

/// Minimal view of an event returned by insert and update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub id: Option<String>,
    pub html_link: Option<String>,
    pub status: Option<String>,
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<Value>,
}
