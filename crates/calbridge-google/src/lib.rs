//! Google Calendar access for the calbridge HTTP bridge.
//!
//! This crate owns the credential lifecycle and the calendar gateway:
//!
//! - [`CredentialStore`] - file-backed persistence of the single
//!   authorized-user record, with fail-open reads
//! - [`Authorizer`] - produces a usable [`Credential`] per request,
//!   preferring the stored record and falling back to the interactive
//!   consent flow
//! - [`OAuthClient`] - the browser-based OAuth 2.0 PKCE consent flow
//! - [`CalendarClient`] - event insert/update/delete/list against the
//!   Calendar API v3
//!
//! # Credential flow
//!
//! ```text
//! authorize() ── store.load() ──── record ────────────► Credential
//!                    │
//!                    └─ none ─► consent flow ─► save ─► Credential
//! ```
//!
//! Stored credentials are returned without network validation; staleness
//! is discovered by the API call that uses them.

pub mod authorizer;
pub mod calendar;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod store;

// Re-export main types at crate root
pub use authorizer::{AuthError, Authorizer, BoxFuture, ConsentFlow, Credential, SCOPES};
pub use calendar::{CalendarClient, EventPayload};
pub use credentials::OAuthCredentials;
pub use error::{ErrorKind, GoogleError, GoogleResult};
pub use oauth::{ConsentGrant, OAuthClient};
pub use store::{AuthorizedUser, CredentialStore, StoreError};
