//! Credential lifecycle: reuse the stored record or run the consent flow.
//!
//! [`Authorizer::authorize`] produces a usable [`Credential`] for exactly
//! one API call. A stored record is returned as-is, without network
//! validation - if its refresh token has gone stale, the downstream API
//! call discovers that, not this layer. Only when no record exists does
//! the interactive consent flow run.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::OAuthCredentials;
use crate::error::GoogleError;
use crate::oauth::ConsentGrant;
use crate::store::{AuthorizedUser, CredentialStore};

/// Boxed future type used by the [`ConsentFlow`] trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Scopes requested during consent.
///
/// The read-only entries are subsumed by their read/write counterparts
/// but are requested anyway. Changing this set invalidates the stored
/// credential file; delete it to re-authorize.
pub const SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.events.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// A usable credential for one calendar API call.
#[derive(Debug, Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    /// Refresh token for minting an access token at call time.
    pub refresh_token: Option<String>,
    /// Present only right after a consent exchange; credentials rebuilt
    /// from the stored record carry none.
    pub access_token: Option<String>,
}

impl Credential {
    fn from_record(record: AuthorizedUser) -> Self {
        Self {
            client_id: record.client_id,
            client_secret: record.client_secret,
            refresh_token: Some(record.refresh_token),
            access_token: None,
        }
    }

    fn from_grant(credentials: &OAuthCredentials, grant: &ConsentGrant) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: grant.refresh_token.clone(),
            access_token: Some(grant.access_token.clone()),
        }
    }

    /// Returns the client identity carried by this credential.
    pub fn oauth_credentials(&self) -> OAuthCredentials {
        OAuthCredentials::new(self.client_id.clone(), self.client_secret.clone())
    }
}

/// A failed authorization. Fatal to the request that asked for it; the
/// caller must respond as unauthenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The interactive consent flow failed: denial, network failure,
    /// or timeout.
    #[error("consent flow failed: {0}")]
    Consent(#[source] GoogleError),

    /// The client configuration file is missing or malformed.
    #[error("invalid client configuration: {0}")]
    ClientConfig(String),
}

/// Interactive consent collaborator.
///
/// Implemented by [`crate::oauth::OAuthClient`] in production; tests
/// substitute fakes.
pub trait ConsentFlow: Send + Sync {
    /// Runs one consent exchange and returns the granted tokens.
    fn obtain<'a>(
        &'a self,
        credentials: &'a OAuthCredentials,
        scopes: &'a [String],
    ) -> BoxFuture<'a, Result<ConsentGrant, GoogleError>>;
}

/// Produces credentials, preferring the stored record over a fresh
/// consent flow.
///
/// Built once per process; the credential store is owned exclusively by
/// this type.
pub struct Authorizer {
    store: CredentialStore,
    credentials_path: PathBuf,
    flow: Box<dyn ConsentFlow>,
    scopes: Vec<String>,
    /// Serializes first-time consent so concurrent requests share one flow.
    consent_gate: Mutex<()>,
}

impl Authorizer {
    /// Creates an authorizer over the given store and client
    /// configuration file.
    pub fn new(
        store: CredentialStore,
        credentials_path: impl Into<PathBuf>,
        flow: Box<dyn ConsentFlow>,
    ) -> Self {
        Self {
            store,
            credentials_path: credentials_path.into(),
            flow,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            consent_gate: Mutex::new(()),
        }
    }

    /// Returns the credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Produces a credential for one API call.
    ///
    /// Returns the stored record when one exists. Otherwise runs the
    /// consent flow, persists the result, and returns it; a persistence
    /// failure costs a repeat consent on the next request, not this one.
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        if let Some(record) = self.store.load() {
            debug!("using stored credential record");
            return Ok(Credential::from_record(record));
        }

        let _gate = self.consent_gate.lock().await;

        // Another request may have completed consent while we waited.
        if let Some(record) = self.store.load() {
            debug!("credential record appeared while waiting on consent");
            return Ok(Credential::from_record(record));
        }

        let credentials = OAuthCredentials::from_file(&self.credentials_path)
            .map_err(AuthError::ClientConfig)?;

        info!("no stored credential, running interactive consent flow");
        let grant = self
            .flow
            .obtain(&credentials, &self.scopes)
            .await
            .map_err(AuthError::Consent)?;

        match grant.refresh_token.as_deref() {
            Some(refresh_token) => {
                let record = AuthorizedUser::new(
                    credentials.client_id.clone(),
                    credentials.client_secret.clone(),
                    refresh_token,
                );
                if let Err(e) = self.store.save(&record) {
                    warn!("failed to persist credential record: {e}");
                }
            }
            None => warn!("consent grant carried no refresh token, nothing persisted"),
        }

        Ok(Credential::from_grant(&credentials, &grant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempfile::{TempDir, tempdir};

    /// Consent flow double that counts invocations and returns a fixed
    /// outcome.
    struct FakeFlow {
        calls: Arc<AtomicUsize>,
        grant: Option<ConsentGrant>,
        delay: Option<Duration>,
    }

    impl FakeFlow {
        fn granting(calls: Arc<AtomicUsize>, refresh_token: Option<&str>) -> Self {
            Self {
                calls,
                grant: Some(ConsentGrant {
                    access_token: "at1".to_string(),
                    refresh_token: refresh_token.map(str::to_string),
                    expires_in: Some(3599),
                }),
                delay: None,
            }
        }

        fn denying(calls: Arc<AtomicUsize>) -> Self {
            Self {
                calls,
                grant: None,
                delay: None,
            }
        }
    }

    impl ConsentFlow for FakeFlow {
        fn obtain<'a>(
            &'a self,
            _credentials: &'a OAuthCredentials,
            _scopes: &'a [String],
        ) -> BoxFuture<'a, Result<ConsentGrant, GoogleError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                match &self.grant {
                    Some(grant) => Ok(grant.clone()),
                    None => Err(GoogleError::authentication("consent denied")),
                }
            })
        }
    }

    fn write_client_config(dir: &Path) -> PathBuf {
        let path = dir.join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "cid", "client_secret": "csec"}}"#,
        )
        .unwrap();
        path
    }

    fn authorizer_in(dir: &TempDir, flow: FakeFlow) -> Authorizer {
        let credentials_path = write_client_config(dir.path());
        let store = CredentialStore::new(dir.path().join("token.json"));
        Authorizer::new(store, credentials_path, Box::new(flow))
    }

    #[tokio::test]
    async fn stored_record_skips_consent() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = authorizer_in(&dir, FakeFlow::granting(calls.clone(), Some("rt1")));

        authorizer
            .store()
            .save(&AuthorizedUser::new("cid", "csec", "stored-rt"))
            .unwrap();

        let credential = authorizer.authorize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(credential.refresh_token.as_deref(), Some("stored-rt"));
        assert!(credential.access_token.is_none());
    }

    #[tokio::test]
    async fn consent_runs_once_then_record_is_reused() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = authorizer_in(&dir, FakeFlow::granting(calls.clone(), Some("rt1")));

        let first = authorizer.authorize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.access_token.as_deref(), Some("at1"));

        // The grant was reshaped with the client identity and persisted.
        let stored = authorizer.store().load().unwrap();
        assert_eq!(stored.client_id, "cid");
        assert_eq!(stored.client_secret, "csec");
        assert_eq!(stored.refresh_token, "rt1");

        let second = authorizer.authorize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.refresh_token.as_deref(), Some("rt1"));
        assert!(second.access_token.is_none());
    }

    #[tokio::test]
    async fn save_failure_still_returns_credential() {
        let dir = tempdir().unwrap();
        let credentials_path = write_client_config(dir.path());

        // Parent of the token path is a file, so save must fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "in the way").unwrap();
        let store = CredentialStore::new(blocker.join("token.json"));

        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = Authorizer::new(
            store,
            credentials_path,
            Box::new(FakeFlow::granting(calls.clone(), Some("rt1"))),
        );

        let credential = authorizer.authorize().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("at1"));

        // Nothing persisted, so the next request repeats consent.
        authorizer.authorize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn corrupt_store_triggers_consent() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = authorizer_in(&dir, FakeFlow::granting(calls.clone(), Some("rt1")));

        std::fs::write(authorizer.store().path(), "{{{ not json").unwrap();

        let credential = authorizer.authorize().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(credential.access_token.as_deref(), Some("at1"));
    }

    #[tokio::test]
    async fn denial_is_an_auth_error() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = authorizer_in(&dir, FakeFlow::denying(calls.clone()));

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(err, AuthError::Consent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_client_config_fails_before_consent() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let store = CredentialStore::new(dir.path().join("token.json"));
        let authorizer = Authorizer::new(
            store,
            dir.path().join("missing-credentials.json"),
            Box::new(FakeFlow::granting(calls.clone(), Some("rt1"))),
        );

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(err, AuthError::ClientConfig(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn grant_without_refresh_token_is_not_persisted() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let authorizer = authorizer_in(&dir, FakeFlow::granting(calls.clone(), None));

        let credential = authorizer.authorize().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("at1"));
        assert!(credential.refresh_token.is_none());
        assert!(authorizer.store().load().is_none());
        assert!(!authorizer.store().path().exists());
    }

    #[tokio::test]
    async fn concurrent_first_time_requests_share_one_consent() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut flow = FakeFlow::granting(calls.clone(), Some("rt1"));
        flow.delay = Some(Duration::from_millis(20));
        let authorizer = authorizer_in(&dir, flow);

        let (a, b) = tokio::join!(authorizer.authorize(), authorizer.authorize());
        a.unwrap();
        b.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
