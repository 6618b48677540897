//! Bridge server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen port, overridable via `PORT` or `--port`.
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// Path to the OAuth client configuration JSON.
    pub credentials_path: PathBuf,

    /// Path to the stored credential record.
    pub token_path: PathBuf,

    /// Calendar the four endpoints operate on.
    pub calendar_id: String,

    /// Upper bound on events returned by the list endpoint.
    pub list_max_results: usize,

    /// Timeout for individual calendar API requests.
    pub api_timeout: Duration,

    /// How long the consent flow waits for the user.
    pub consent_timeout: Duration,

    /// Port range tried for the consent redirect listener.
    pub loopback_ports: (u16, u16),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            calendar_id: "primary".to_string(),
            list_max_results: 10,
            api_timeout: Duration::from_secs(30),
            consent_timeout: Duration::from_secs(300),
            loopback_ports: (8080, 8090),
        }
    }
}

impl ServerConfig {
    /// Builder: set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Builder: set the client configuration path.
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    /// Builder: set the credential record path.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Builder: set the calendar id.
    pub fn with_calendar_id(mut self, id: impl Into<String>) -> Self {
        self.calendar_id = id.into();
        self
    }

    /// Builder: set the consent flow timeout.
    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.calendar_id.is_empty() {
            return Err("calendar_id must not be empty".to_string());
        }
        if self.list_max_results == 0 {
            return Err("list_max_results must be at least 1".to_string());
        }
        if self.loopback_ports.0 > self.loopback_ports.1 {
            return Err("invalid loopback port range".to_string());
        }
        if self.consent_timeout.is_zero() {
            return Err("consent_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}
