//! Client configuration provisioned from the Google Cloud Console.
//!
//! The bridge never creates this file; it is downloaded from the Cloud
//! Console OAuth credentials page and supplied out-of-band.

use std::path::Path;

use serde::Deserialize;

/// OAuth 2.0 client identity used for consent and token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

/// On-disk layout of the client configuration file: a single `installed`
/// or `web` section holding the client identity and redirect metadata.
#[derive(Debug, Deserialize)]
struct ClientConfigFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    /// Present in the downloaded JSON but not used by the bridge.
    #[serde(default)]
    #[allow(dead_code)]
    project_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    redirect_uris: Vec<String>,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads the client configuration from a Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read client configuration: {e}"))?;
        Self::from_json(&content)
    }

    /// Parses the client configuration from a JSON string.
    ///
    /// Accepts either an `installed` (desktop) or `web` section; `installed`
    /// wins when both are present.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: ClientConfigFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse client configuration: {e}"))?;

        let section = file.installed.or(file.web).ok_or_else(|| {
            "client configuration must contain an 'installed' or 'web' section".to_string()
        })?;

        let credentials = Self::new(section.client_id, section.client_secret);
        credentials.validate()?;
        Ok(credentials)
    }

    /// Checks that both identity fields are present.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("client_id is required".to_string());
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required".to_string());
        }
        Ok(())
    }
}
