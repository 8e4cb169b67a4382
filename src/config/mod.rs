//! Configuration Management
//!
//! This module resolves where neonctl keeps its state and loads the
//! per-directory context file.
//!
//! # Configuration Locations
//! - Config directory: `--config-dir` / `NEON_CONFIG_DIR`, else
//!   `~/.config/neonctl` (platform config dir)
//! - Credentials: `<config dir>/credentials.json`
//! - Context: `./.neon` (per working directory, written by `set-context`)
//!
//! # Project Resolution Precedence
//! 1. Explicit `--project-id` (highest priority)
//! 2. Context file (`.neon`)
//! 3. The only project the account owns

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::CredentialStore;
use crate::error::{CtlError, Result};

/// Control-plane API base URL
pub const DEFAULT_API_HOST: &str = "https://console.neon.tech/api/v2";

/// OAuth issuer
pub const DEFAULT_OAUTH_HOST: &str = "https://oauth2.neon.tech";

/// Context file name, relative to the working directory
pub const CONTEXT_FILE: &str = ".neon";

const CONFIG_DIR_NAME: &str = "neonctl";

/// Per-directory defaults written by `set-context`
///
/// Stored as `{"projectId": "...", "orgId": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl ContextFile {
    /// Load the context file; a missing file is an empty context
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CtlError::config_error(format!("Could not read context file: {e}")))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            CtlError::config_error(format!(
                "Invalid context file format in {}: {e}",
                path.display()
            ))
        })
    }

    /// Overwrite the context file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CtlError::config_error(format!("Could not serialize context: {e}")))?;

        fs::write(path, json)
            .map_err(|e| CtlError::config_error(format!("Could not write context file: {e}")))
    }
}

/// Default config directory (`~/.config/neonctl` on Linux)
pub fn default_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| CtlError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join(CONFIG_DIR_NAME))
}

/// Resolve the config directory and create it if missing
pub fn ensure_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => default_config_dir()?,
    };

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            CtlError::config_error(format!(
                "Could not create config directory {}: {e}",
                dir.display()
            ))
        })?;
    }

    Ok(dir)
}

/// Resolved settings for one invocation
#[derive(Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_host: String,
    pub oauth_host: String,
    pub client_id: String,
    pub config_dir: PathBuf,
    pub context_file: PathBuf,
    /// `CI` is set in the environment
    pub ci: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_host", &self.api_host)
            .field("oauth_host", &self.oauth_host)
            .field("client_id", &self.client_id)
            .field("config_dir", &self.config_dir)
            .field("context_file", &self.context_file)
            .field("ci", &self.ci)
            .finish()
    }
}

impl Settings {
    #[must_use]
    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::in_dir(&self.config_dir)
    }

    pub fn context(&self) -> Result<ContextFile> {
        ContextFile::load(&self.context_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_context_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let context = ContextFile::load(&dir.path().join(CONTEXT_FILE)).unwrap();
        assert_eq!(context, ContextFile::default());
    }

    #[test]
    fn test_context_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONTEXT_FILE);
        let context = ContextFile { project_id: Some("proj-1".into()), org_id: None };
        context.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""projectId": "proj-1""#));
        assert!(!raw.contains("orgId"));
        assert_eq!(ContextFile::load(&path).unwrap(), context);
    }

    #[test]
    fn test_invalid_context_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONTEXT_FILE);
        fs::write(&path, "projectId=abc").unwrap();

        let err = ContextFile::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_explicit_config_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("neonctl");

        let resolved = ensure_config_dir(Some(&nested)).unwrap();
        assert_eq!(resolved, nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn test_credentials_live_in_config_dir() {
        let settings = Settings {
            api_key: Some("secret".into()),
            api_host: DEFAULT_API_HOST.into(),
            oauth_host: DEFAULT_OAUTH_HOST.into(),
            client_id: "neonctl".into(),
            config_dir: PathBuf::from("/tmp/neonctl-test"),
            context_file: PathBuf::from(CONTEXT_FILE),
            ci: false,
        };
        assert_eq!(
            settings.credentials().path(),
            Path::new("/tmp/neonctl-test/credentials.json")
        );
        assert!(!format!("{settings:?}").contains("secret"));
    }
}
