//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout neonctl.
//! All errors are structured and map to specific error codes for the top-level handler.
//!
//! # Error Categories
//! - `PointInTimeParse`: Malformed point-in-time qualifier (`branch@...`)
//! - `NotFound`: Branch, role, database, endpoint or project not found
//! - `Ambiguous`: More than one role/database candidate and none specified
//! - `InvalidInput`: Malformed input or conflicting flags
//! - `Auth`: Login, refresh or callback failures (see [`AuthError`])
//! - `Unauthorized`: The control plane rejected the bearer token
//! - `Api`: Any other non-success response from the control plane
//! - `Http`: Transport-level HTTP failures
//! - `Config`: Config directory, credential or context file errors
//! - `Process`: Spawning or waiting on a local `psql`

use thiserror::Error;

/// Main error type for neonctl operations
#[derive(Error, Debug)]
pub enum CtlError {
    /// Malformed point-in-time qualifier
    #[error("{0}")]
    PointInTimeParse(String),

    /// Requested entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// More than one candidate and the user did not pick one
    #[error("{0}")]
    Ambiguous(String),

    /// Invalid input or conflicting parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The control plane answered 401
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The control plane answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure talking to the control plane
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (config directory, context file, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Local process (psql) failure
    #[error("Process error: {0}")]
    Process(String),
}

/// Authentication failures
///
/// `Timeout` is kept apart from the rest so the user sees a distinct message
/// when the browser flow was simply never completed.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("OAuth discovery failed: {0}")]
    Discovery(String),

    #[error("Failed to start the local callback listener: {0}")]
    Listener(String),

    #[error("Failed to open web browser: {0}")]
    BrowserOpen(String),

    #[error("Authorization failed: {0}")]
    Callback(String),

    #[error("OAuth state mismatch, the callback did not originate from this login attempt")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Cannot run interactive auth in CI, provide --api-key instead")]
    InteractiveUnavailable,
}

impl AuthError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "AUTH_TIMEOUT",
            _ => "AUTH_FAILED",
        }
    }
}

impl CtlError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PointInTimeParse(_) => "POINT_IN_TIME_PARSE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Ambiguous(_) => "AMBIGUOUS",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Auth(err) => err.error_code(),
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Api { .. } => "API_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Process(_) => "PROCESS_ERROR",
        }
    }

    /// Get human-readable error message (no tokens or passwords)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a point-in-time parse error
    pub fn point_in_time(message: impl Into<String>) -> Self {
        Self::PointInTimeParse(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an ambiguity error
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::Ambiguous(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a process error
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process(message.into())
    }

    /// Whether the control plane rejected our credentials
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Result type alias for neonctl operations
pub type Result<T> = std::result::Result<T, CtlError>;
