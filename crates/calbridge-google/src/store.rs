//! Persistence for the authorized-user credential record.
//!
//! Exactly one record is kept: the client identity plus the refresh token
//! obtained from a completed consent flow. Reads fail open - a missing,
//! unreadable, or malformed file is reported as "no credential", which
//! sends the caller back through the consent flow instead of erroring.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Tag identifying the record format on disk.
pub const RECORD_TYPE: &str = "authorized_user";

/// The persisted credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedUser {
    /// Fixed `"authorized_user"` tag.
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl AuthorizedUser {
    /// Creates a record with the standard type tag.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            record_type: RECORD_TYPE.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Returns true if every field is present and non-empty.
    ///
    /// A record without a refresh token cannot mint new access tokens and
    /// is useless; it gets discarded so the next request re-authorizes.
    pub fn is_complete(&self) -> bool {
        self.record_type == RECORD_TYPE
            && !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.refresh_token.is_empty()
    }
}

/// Errors from writing the credential record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to write the credential file.
    #[error("failed to write credential file: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize the credential record.
    #[error("failed to serialize credential record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// File-backed storage for exactly one [`AuthorizedUser`] record.
///
/// The storage location is injected at construction; the store is built
/// once per process and shared by reference.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted record, if a usable one exists.
    ///
    /// Returns `None` for a missing, unreadable, malformed, or incomplete
    /// record - never an error.
    pub fn load(&self) -> Option<AuthorizedUser> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("no credential file at {:?}: {}", self.path, e);
                return None;
            }
        };

        let record: AuthorizedUser = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("ignoring malformed credential file {:?}: {}", self.path, e);
                return None;
            }
        };

        if !record.is_complete() {
            warn!("ignoring incomplete credential record in {:?}", self.path);
            return None;
        }

        debug!("loaded credential record from {:?}", self.path);
        Some(record)
    }

    /// Overwrites the backing file with the given record.
    ///
    /// Writes to a temporary file and renames it into place, so a
    /// concurrent `load` never observes a partial record.
    pub fn save(&self, record: &AuthorizedUser) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(record)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &self.path)?;

        // The record holds a client secret and refresh token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!("saved credential record to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record() -> AuthorizedUser {
        AuthorizedUser::new("client-id", "client-secret", "refresh-token")
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));

        store.save(&record()).unwrap();
        assert_eq!(store.load(), Some(record()));
    }

    #[test]
    fn load_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));

        store.save(&record()).unwrap();
        assert_eq!(store.load(), store.load());
    }

    #[test]
    fn malformed_content_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "not json {").unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn truncated_content_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        let full = serde_json::to_string(&record()).unwrap();
        fs::write(&path, &full[..full.len() / 2]).unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn incomplete_record_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"type":"authorized_user","client_id":"","client_secret":"x","refresh_token":"y"}"#,
        )
        .unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn missing_refresh_token_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"type":"authorized_user","client_id":"a","client_secret":"b"}"#,
        )
        .unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn wrong_type_tag_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"type":"service_account","client_id":"a","client_secret":"b","refresh_token":"c"}"#,
        )
        .unwrap();

        let store = CredentialStore::new(path);
        assert!(store.load().is_none());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token.json"));

        store.save(&record()).unwrap();
        let replacement = AuthorizedUser::new("client-id", "client-secret", "newer-token");
        store.save(&replacement).unwrap();

        assert_eq!(store.load(), Some(replacement));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("token.json"));

        store.save(&record()).unwrap();
        assert!(store.load().is_some());
    }

    #[test]
    fn save_into_blocked_path_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = CredentialStore::new(blocker.join("token.json"));
        assert!(store.save(&record()).is_err());
    }

    #[test]
    fn serialized_record_uses_type_tag() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["type"], "authorized_user");
        assert_eq!(json["refresh_token"], "refresh-token");
    }
}
