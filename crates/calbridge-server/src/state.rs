//! Shared application state.

use std::sync::Arc;

use calbridge_google::{Authorizer, CredentialStore, OAuthClient};

use crate::config::ServerConfig;

/// State shared by every request handler.
///
/// The authorizer (and the credential store it owns) is constructed once
/// per process; handlers borrow it through the `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wires the credential store, consent flow, and authorizer from the
    /// given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let store = CredentialStore::new(&config.token_path);
        let flow = OAuthClient::new(
            config.api_timeout,
            config.consent_timeout,
            config.loopback_ports,
        );
        let authorizer = Authorizer::new(store, &config.credentials_path, Box::new(flow));

        Self {
            authorizer: Arc::new(authorizer),
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wires_store_to_configured_path() {
        let config = ServerConfig::default().with_token_path("/tmp/calbridge-test-token.json");
        let state = AppState::new(config);

        assert_eq!(
            state.authorizer.store().path(),
            std::path::Path::new("/tmp/calbridge-test-token.json")
        );
        assert_eq!(state.config.calendar_id, "primary");
    }
}
