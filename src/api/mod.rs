//! Control-Plane Collaborator
//!
//! This module defines the records fetched from the control-plane API and the
//! [`ControlPlane`] trait through which every command talks to it.
//!
//! # Read-Only Catalog
//! Branch, endpoint, role and database records are fetched fresh for each
//! resolution and never mutated locally. Resolution code only depends on the
//! trait, so tests substitute in-process doubles for [`ApiClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod client;

pub use client::ApiClient;

/// Project record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
}

/// Branch record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,

    /// Default branch of the project
    #[serde(default)]
    pub default: bool,

    /// Legacy flag for the default branch, still sent by older projects
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Branch {
    /// Whether this branch is the project's default (primary) branch
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.default || self.primary
    }
}

/// Compute endpoint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum EndpointType {
    ReadWrite,
    ReadOnly,
}

impl EndpointType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWrite => "read_write",
            Self::ReadOnly => "read_only",
        }
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute endpoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint ID, also the first DNS label of `host` (`ep-cool-darkness-123456`)
    pub id: String,
    pub host: String,
    pub branch_id: String,

    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
}

/// Postgres role record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,

    #[serde(default)]
    pub protected: bool,
}

/// Postgres database record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

/// Current account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Body of a branch restore request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub source_branch_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lsn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_under_name: Option<String>,
}

/// Typed operations of the control-plane API
///
/// Every method is a suspension point; implementations must not cache across
/// calls.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>>;

    async fn get_branch(&self, project_id: &str, branch_id: &str) -> Result<Branch>;

    async fn list_endpoints(&self, project_id: &str, branch_id: &str) -> Result<Vec<Endpoint>>;

    async fn list_roles(&self, project_id: &str, branch_id: &str) -> Result<Vec<Role>>;

    async fn list_databases(&self, project_id: &str, branch_id: &str) -> Result<Vec<Database>>;

    /// Reveal a role's password. Never log the result.
    async fn get_role_password(
        &self,
        project_id: &str,
        branch_id: &str,
        role_name: &str,
    ) -> Result<String>;

    async fn current_user(&self) -> Result<User>;

    async fn restore_branch(
        &self,
        project_id: &str,
        branch_id: &str,
        request: &RestoreRequest,
    ) -> Result<Branch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_default_flags() {
        let branch: Branch =
            serde_json::from_str(r#"{"id":"br-a-b-123456","name":"main","primary":true}"#).unwrap();
        assert!(branch.is_default());
        assert!(!branch.default);

        let branch: Branch =
            serde_json::from_str(r#"{"id":"br-a-b-123456","name":"dev"}"#).unwrap();
        assert!(!branch.is_default());
        assert!(branch.parent_id.is_none());
    }

    #[test]
    fn test_endpoint_type_wire_format() {
        let endpoint: Endpoint = serde_json::from_str(
            r#"{"id":"ep-x-y-1","host":"ep-x-y-1.us-east-2.aws.neon.tech","branch_id":"br-a-b-123456","type":"read_only"}"#,
        )
        .unwrap();
        assert_eq!(endpoint.endpoint_type, EndpointType::ReadOnly);
        assert_eq!(serde_json::to_string(&EndpointType::ReadWrite).unwrap(), r#""read_write""#);
    }

    #[test]
    fn test_restore_request_omits_unset_fields() {
        let request =
            RestoreRequest { source_branch_id: "br-a-b-123456".into(), ..Default::default() };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"source_branch_id":"br-a-b-123456"}"#);
    }
}
