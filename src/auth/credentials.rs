//! Credential Store
//!
//! Persists the OAuth token set as `credentials.json` in the config
//! directory with owner-only permissions (0600).
//!
//! # Concurrency
//! There is no file locking. Two invocations sharing a config directory race
//! on this file and the last writer wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CtlError, Result};

/// Credential file name inside the config directory
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// OAuth token set as persisted on disk
///
/// Replaced wholesale on every login or refresh, never patched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for the control-plane API
    #[serde(default)]
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Expiry in epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl TokenSet {
    /// Whether the access token is expired at `now` (epoch seconds).
    ///
    /// A token set without `expires_at` never expires locally.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

/// Outcome of reading the credential file
#[derive(Debug)]
pub enum StoredCredentials {
    /// File does not exist
    Missing,
    /// File exists but cannot be used (unreadable, not JSON, not an object,
    /// no access token)
    Unusable(String),
    Present(TokenSet),
}

/// File-backed token store; no network access
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store living in `config_dir/credentials.json`
    pub fn in_dir(config_dir: &Path) -> Self {
        Self { path: config_dir.join(CREDENTIALS_FILE) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token set, classifying every failure instead of erroring.
    pub fn load(&self) -> StoredCredentials {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return StoredCredentials::Missing;
            }
            Err(e) => return StoredCredentials::Unusable(format!("unreadable: {e}")),
        };

        let value: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => return StoredCredentials::Unusable(format!("invalid JSON: {e}")),
        };
        if !value.is_object() {
            return StoredCredentials::Unusable("not a JSON object".into());
        }

        match serde_json::from_value::<TokenSet>(value) {
            Ok(tokens) if tokens.access_token.is_empty() => {
                StoredCredentials::Unusable("missing access token".into())
            }
            Ok(tokens) => StoredCredentials::Present(tokens),
            Err(e) => StoredCredentials::Unusable(format!("unexpected shape: {e}")),
        }
    }

    /// Write the token set via a temp file and rename, mode 0600.
    pub fn save(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CtlError::config_error(format!("Could not create config directory: {e}"))
            })?;
        }

        let contents = serde_json::to_string(tokens)
            .map_err(|e| CtlError::config_error(format!("Could not serialize credentials: {e}")))?;
        let temp_path = self.path.with_extension("json.tmp");

        let written = open_private(&temp_path).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(CtlError::config_error(format!("Could not write credentials file: {e}")));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(CtlError::config_error(format!("Could not replace credentials file: {e}")));
        }

        debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    /// Remove the credential file. Returns whether a file was removed.
    pub fn delete(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(CtlError::config_error(format!("Could not delete credentials file: {e}")))
            }
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
    // mode() only applies on creation; a leftover temp file keeps its old bits
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TokenSet {
        TokenSet {
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            id_token: None,
            token_type: Some("bearer".into()),
            scope: None,
            expires_at: Some(1_700_000_000),
            user_id: Some("user-1".into()),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(matches!(store.load(), StoredCredentials::Missing));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save(&sample()).unwrap();

        match store.load() {
            StoredCredentials::Present(tokens) => assert_eq!(tokens, sample()),
            other => panic!("expected credentials, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save(&sample()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unusable_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());

        for contents in ["{not json", "[1, 2]", "\"token\"", "{}", r#"{"access_token": ""}"#] {
            fs::write(store.path(), contents).unwrap();
            assert!(
                matches!(store.load(), StoredCredentials::Unusable(_)),
                "{contents} should be unusable"
            );
        }
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        fs::write(store.path(), r#"{"access_token":"a","session_state":"x","expires_at":1}"#)
            .unwrap();
        assert!(matches!(store.load(), StoredCredentials::Present(_)));
    }

    #[test]
    fn test_save_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save(&sample()).unwrap();

        let replacement = TokenSet {
            access_token: "access-2".into(),
            refresh_token: None,
            id_token: None,
            token_type: None,
            scope: None,
            expires_at: None,
            user_id: None,
        };
        store.save(&replacement).unwrap();

        match store.load() {
            StoredCredentials::Present(tokens) => {
                assert_eq!(tokens.access_token, "access-2");
                assert!(tokens.refresh_token.is_none());
                assert!(tokens.user_id.is_none());
            }
            other => panic!("expected credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("keep"), "x").unwrap();

        let err = store.save(&sample()).unwrap_err();
        assert!(err.message().contains("Could not replace credentials file"));
        assert!(!store.path().with_extension("json.tmp").exists());
        assert!(store.path().is_dir());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(!store.delete().unwrap());
        store.save(&sample()).unwrap();
        assert!(store.delete().unwrap());
        assert!(matches!(store.load(), StoredCredentials::Missing));
    }

    #[test]
    fn test_expiry() {
        let tokens = sample();
        assert!(tokens.is_expired_at(1_700_000_000));
        assert!(tokens.is_expired_at(1_700_000_001));
        assert!(!tokens.is_expired_at(1_699_999_999));

        let no_expiry = TokenSet { expires_at: None, ..sample() };
        assert!(!no_expiry.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
    }
}
