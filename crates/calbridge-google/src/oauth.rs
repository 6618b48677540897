//! Interactive OAuth 2.0 consent flow.
//!
//! Implements the authorization code flow with PKCE and a loopback
//! redirect: a local HTTP listener receives the authorization code after
//! the user grants access in their browser, and the code is exchanged for
//! an access/refresh token pair.
//!
//! The flow blocks until the user completes or denies consent, bounded by
//! a configurable timeout.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::authorizer::{BoxFuture, ConsentFlow};
use crate::credentials::OAuthCredentials;
use crate::error::{GoogleError, GoogleResult};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Tokens handed back by a completed consent exchange.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    /// Access token usable immediately.
    pub access_token: String,
    /// Refresh token for minting future access tokens. Google omits it on
    /// repeat consent unless `prompt=consent` is requested.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<i64>,
}

/// Runs the browser-based consent exchange against Google's OAuth endpoints.
#[derive(Debug)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    consent_timeout: Duration,
    loopback_ports: (u16, u16),
}

impl OAuthClient {
    /// Creates a consent flow client.
    ///
    /// `request_timeout` bounds individual token-endpoint requests;
    /// `consent_timeout` bounds the wait for the user to act in the
    /// browser; `loopback_ports` is the range tried for the redirect
    /// listener.
    pub fn new(
        request_timeout: Duration,
        consent_timeout: Duration,
        loopback_ports: (u16, u16),
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            consent_timeout,
            loopback_ports,
        }
    }

    /// Runs the full consent flow and returns the obtained tokens.
    ///
    /// Opens the user's browser to the consent page, waits for the
    /// loopback redirect, and exchanges the authorization code. Fails on
    /// denial, timeout, or a failed exchange.
    pub async fn run_consent(
        &self,
        credentials: &OAuthCredentials,
        scopes: &[String],
    ) -> GoogleResult<ConsentGrant> {
        let pkce = PkceFlow::new();

        let (listener, port) = self.bind_loopback()?;
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let auth_url = pkce.build_auth_url(&credentials.client_id, &redirect_uri, scopes);

        info!("starting consent flow, opening browser");
        debug!("authorization URL: {auth_url}");

        if let Err(e) = open::that(&auth_url) {
            warn!("failed to open browser: {e}");
            eprintln!("\nOpen this URL in your browser to authorize access:\n\n{auth_url}\n");
        }

        let timeout = self.consent_timeout;
        let (code, received_state) =
            tokio::task::spawn_blocking(move || Self::wait_for_callback(listener, timeout))
                .await
                .map_err(|e| GoogleError::internal(format!("callback task failed: {e}")))??;

        if received_state != pkce.state {
            return Err(GoogleError::authentication(
                "consent state mismatch - possible CSRF attack",
            ));
        }

        debug!("received authorization code, exchanging for tokens");
        self.exchange_code(credentials, &code, &pkce.verifier, &redirect_uri)
            .await
    }

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        credentials: &OAuthCredentials,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> GoogleResult<ConsentGrant> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleError::network(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GoogleError::network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(GoogleError::authentication(format!(
                "token exchange failed ({status}): {body}"
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleError::invalid_response(format!("invalid token response: {e}")))?;

        info!("consent exchange complete");
        Ok(ConsentGrant {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        })
    }

    /// Binds the redirect listener on the first free port in the range.
    fn bind_loopback(&self) -> GoogleResult<(TcpListener, u16)> {
        let (start, end) = self.loopback_ports;
        for port in start..=end {
            if let Ok(listener) = TcpListener::bind(format!("127.0.0.1:{port}")) {
                debug!("bound loopback listener on port {port}");
                return Ok((listener, port));
            }
        }
        Err(GoogleError::configuration(format!(
            "no available loopback port in range {start}-{end}"
        )))
    }

    /// Waits for the redirect and extracts the authorization code and state.
    fn wait_for_callback(
        listener: TcpListener,
        timeout: Duration,
    ) -> GoogleResult<(String, String)> {
        listener
            .set_nonblocking(false)
            .map_err(|e| GoogleError::internal(format!("failed to set blocking: {e}")))?;

        let (tx, rx) = mpsc::channel();

        let _handle = thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = Self::handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => {
                        error!("failed to accept connection: {e}");
                    }
                }
            }
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(GoogleError::authentication(
                "timed out waiting for consent",
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(GoogleError::internal("callback channel disconnected"))
            }
        }
    }

    /// Handles one HTTP request on the redirect listener.
    ///
    /// Returns `None` for requests that are not the callback, so the
    /// listener keeps waiting (browsers probe for favicons and the like).
    fn handle_callback(mut stream: TcpStream) -> Option<GoogleResult<(String, String)>> {
        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();

        if reader.read_line(&mut request_line).is_err() {
            return None;
        }

        // Request line: GET /callback?code=...&state=... HTTP/1.1
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 || parts[0] != "GET" {
            return None;
        }

        let path = parts[1];
        if !path.starts_with("/callback") {
            return None;
        }

        let query_start = path.find('?').map(|i| i + 1).unwrap_or(path.len());
        let callback = CallbackParams::parse(&path[query_start..]);

        let response = if callback.error.is_some() || callback.code.is_none() {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Failed</h1>\
            <p>You can close this window.</p></body></html>"
        } else {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Successful</h1>\
            <p>You can close this window.</p></body></html>"
        };

        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();

        if let Some(error) = callback.error {
            return Some(Err(GoogleError::authentication(format!(
                "authorization denied: {error}"
            ))));
        }

        match callback.code {
            Some(code) => Some(Ok((code, callback.state.unwrap_or_default()))),
            None => Some(Err(GoogleError::authentication(
                "missing authorization code in callback",
            ))),
        }
    }
}

impl ConsentFlow for OAuthClient {
    fn obtain<'a>(
        &'a self,
        credentials: &'a OAuthCredentials,
        scopes: &'a [String],
    ) -> BoxFuture<'a, GoogleResult<ConsentGrant>> {
        Box::pin(self.run_consent(credentials, scopes))
    }
}

/// Exchanges a refresh token for a fresh access token.
///
/// This is the path a credential rebuilt from the stored record takes on
/// its way into an API call; a revoked or stale refresh token fails here
/// and surfaces as an API-call error, not an authorization error.
pub async fn refresh_access_token(
    http_client: &reqwest::Client,
    credentials: &OAuthCredentials,
    refresh_token: &str,
) -> GoogleResult<(String, Option<i64>)> {
    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let response = http_client
        .post(GOOGLE_TOKEN_URL)
        .form(&params)
        .send()
        .await
        .map_err(|e| GoogleError::network(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GoogleError::network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(GoogleError::authentication(format!(
            "token refresh failed ({status}): {body}"
        )));
    }

    let token_response: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| GoogleError::invalid_response(format!("invalid token response: {e}")))?;

    debug!("minted access token from refresh token");
    Ok((token_response.access_token, token_response.expires_in))
}

/// Query parameters of the redirect callback.
#[derive(Debug, Default, PartialEq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for param in query.split('&') {
            let mut kv = param.splitn(2, '=');
            if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
                let value = urlencoding::decode(value).unwrap_or_default().into_owned();
                match key {
                    "code" => params.code = Some(value),
                    "state" => params.state = Some(value),
                    "error" => params.error = Some(value),
                    _ => {}
                }
            }
        }
        params
    }
}

/// PKCE state for one flow (RFC 7636).
#[derive(Debug)]
struct PkceFlow {
    /// High-entropy random code verifier.
    verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    challenge: String,
    /// Random state for CSRF protection.
    state: String,
}

impl PkceFlow {
    fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::generate_state();

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    fn generate_state() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..16).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Builds the consent page URL.
    ///
    /// `access_type=offline` with `prompt=consent` makes Google return a
    /// refresh token even for repeat authorizations.
    fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}
