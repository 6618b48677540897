//! HTTP bridge exposing Google Calendar event CRUD over REST.
//!
//! Four endpoints proxy create, update, delete, and list onto the
//! calendar API. Every request asks the [`Authorizer`] for a credential
//! first; the first request ever triggers the browser consent flow, and
//! the persisted record covers everything after that.
//!
//! [`Authorizer`]: calbridge_google::Authorizer

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use routes::{ApiResponse, BridgeError, router};
pub use state::AppState;
