//! neonctl - command-line client for the Neon control plane
//!
//! The library holds everything with real decision logic: turning branch
//! expressions into IDs, deciding which credentials a command runs with, and
//! building connection URIs. The binary is a thin wrapper over [`cli::run`].
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - Output writer and error envelope
//! - [`config`] - Config directory, context file, settings
//! - [`formats`] - Branch ID / LSN / timestamp classifiers
//! - [`point_in_time`] - `branch@qualifier` parsing and `^self` / `^parent`
//! - [`resolve`] - Branch and project resolution
//! - [`api`] - Control-plane client
//! - [`auth`] - Credential store, OAuth login and refresh
//! - [`connection_string`] - Connection URI construction
//! - [`psql`] - Local `psql` hand-off
//! - [`cli`] - Command definitions and handlers

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod connection_string;
pub mod error;
pub mod formats;
pub mod output;
pub mod point_in_time;
pub mod psql;
pub mod resolve;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use api::{ApiClient, Branch, ControlPlane, Endpoint, EndpointType};
pub use auth::{ensure_auth, AuthContext, Authenticator, Credential, CredentialStore, TokenSet};
pub use connection_string::{ConnectionOptions, ConnectionTarget, SslMode};
pub use error::{AuthError, CtlError, Result};
pub use formats::{looks_like_branch_id, looks_like_lsn, looks_like_timestamp};
pub use point_in_time::{parse_pit_branch, PitBranch, PointInTime, ResolvedPointInTime};
pub use resolve::{branch_id_resolve, project_id_resolve};
