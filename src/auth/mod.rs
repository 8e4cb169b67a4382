//! Auth State Machine
//!
//! Decides, once per invocation, which bearer token the command will use.
//!
//! # States
//! - `NoCredentials` → `Authenticating` → `Authenticated`
//! - `Authenticated(expired)` → `Refreshing` → `Authenticated`, or
//!   `Authenticating` when the refresh is rejected
//!
//! # Decision Order
//! 1. An explicit API key, or the `auth` command itself: no file or network work
//! 2. Missing or unusable credential file: interactive login
//! 3. Expired token set: one silent refresh, then at most one interactive login
//! 4. Valid token set: used as-is, never validated up front
//!
//! Successful logins and refreshes are persisted through the
//! [`CredentialStore`] together with the user ID looked up from the control
//! plane.

pub mod credentials;
pub mod oauth;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};

pub use credentials::{CredentialStore, StoredCredentials, TokenSet, CREDENTIALS_FILE};
pub use oauth::{OAuthAuthenticator, AUTH_TIMEOUT};

/// Identity provider operations the state machine depends on
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Run the interactive browser login
    async fn login(&self) -> Result<TokenSet>;

    /// Trade the stored refresh token for a new token set
    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet>;

    /// Look up the ID of the user owning `access_token`
    async fn user_id(&self, access_token: &str) -> Result<String>;
}

/// Inputs that decide the auth path for one invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthContext<'a> {
    /// `--api-key` / `NEON_API_KEY`
    pub api_key: Option<&'a str>,
    /// The invoked command is `auth`
    pub is_auth_command: bool,
    /// Running under CI (`CI` is set); interactive login is refused
    pub ci: bool,
}

/// Token chosen for the invocation
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Supplied on the command line or environment
    ApiKey(String),
    /// Read from (or just written to) the credential file
    Stored(String),
    /// The `auth` command runs its own login
    None,
}

impl Credential {
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::ApiKey(token) | Self::Stored(token) => Some(token),
            Self::None => None,
        }
    }

    /// Whether a 401 should invalidate the credential file
    #[must_use]
    pub const fn from_credentials_file(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("Credential::ApiKey(<redacted>)"),
            Self::Stored(_) => f.write_str("Credential::Stored(<redacted>)"),
            Self::None => f.write_str("Credential::None"),
        }
    }
}

/// Yield the token the current command should use.
pub async fn ensure_auth(
    ctx: &AuthContext<'_>,
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
) -> Result<Credential> {
    if let Some(key) = ctx.api_key.filter(|key| !key.is_empty()) {
        debug!("using api key from command line");
        return Ok(Credential::ApiKey(key.to_string()));
    }
    if ctx.is_auth_command {
        return Ok(Credential::None);
    }

    let tokens = match store.load() {
        StoredCredentials::Present(tokens) if !tokens.is_expired() => {
            debug!("using stored credentials");
            tokens
        }
        StoredCredentials::Present(tokens) => {
            debug!("stored token expired, refreshing");
            match refresh_and_persist(store, authenticator, &tokens).await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!("Failed to refresh token: {}", e.message());
                    login_after_failed_refresh(ctx, store, authenticator).await?
                }
            }
        }
        StoredCredentials::Missing => {
            info!("No credentials found, starting authentication");
            interactive_login(ctx, store, authenticator).await?
        }
        StoredCredentials::Unusable(reason) => {
            warn!(%reason, "Credentials file is unusable, starting authentication");
            interactive_login(ctx, store, authenticator).await?
        }
    };

    Ok(Credential::Stored(tokens.access_token))
}

/// Run the browser login and persist the result; backs the `auth` command.
pub async fn login_and_persist(
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
) -> Result<TokenSet> {
    let tokens = authenticator.login().await?;
    persist(store, authenticator, tokens).await
}

async fn interactive_login(
    ctx: &AuthContext<'_>,
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
) -> Result<TokenSet> {
    if ctx.ci {
        return Err(AuthError::InteractiveUnavailable.into());
    }
    login_and_persist(store, authenticator).await
}

async fn login_after_failed_refresh(
    ctx: &AuthContext<'_>,
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
) -> Result<TokenSet> {
    match interactive_login(ctx, store, authenticator).await {
        Ok(tokens) => Ok(tokens),
        Err(e) => {
            // Neither path worked; the next run starts from a clean slate.
            if let Err(delete_err) = store.delete() {
                warn!("{}", delete_err.message());
            }
            Err(e)
        }
    }
}

async fn refresh_and_persist(
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
    tokens: &TokenSet,
) -> Result<TokenSet> {
    let refreshed = authenticator.refresh(tokens).await?;
    persist(store, authenticator, refreshed).await
}

async fn persist(
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
    mut tokens: TokenSet,
) -> Result<TokenSet> {
    match authenticator.user_id(&tokens.access_token).await {
        Ok(user_id) => tokens.user_id = Some(user_id),
        Err(e) => warn!("Could not look up the current user: {}", e.message()),
    }
    store.save(&tokens)?;
    debug!(path = %store.path().display(), "credentials updated");
    Ok(tokens)
}
