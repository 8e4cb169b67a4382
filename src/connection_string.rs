//! Connection String Construction
//!
//! Combines a resolved branch, one of its endpoints, a role, a database and
//! the role's password into a `postgresql://` URI.
//!
//! # Host Naming
//! - Direct: `ep-cool-darkness-123456.us-east-2.aws.neon.tech`
//! - Pooled: `ep-cool-darkness-123456-pooler.us-east-2.aws.neon.tech`
//! - Point in time: `br-wispy-meadow-118737.us-east-2.aws.neon.tech`
//!
//! Pooling and point-in-time addressing use different host schemes, so
//! requesting both is rejected before anything is resolved.

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::api::{ControlPlane, Endpoint, EndpointType};
use crate::error::{CtlError, Result};
use crate::point_in_time::{parse_pit_branch, PointInTime, ResolvedPointInTime};
use crate::resolve::branch_id_resolve;

/// Prisma's recommended timeouts (seconds)
const PRISMA_CONNECT_TIMEOUT: &str = "30";
const PRISMA_POOL_TIMEOUT: &str = "30";

/// `sslmode` query parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Require,
    Prefer,
    Disable,
    VerifyFull,
    /// Leave `sslmode` out of the URI
    Omit,
}

impl SslMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::Prefer => "prefer",
            Self::Disable => "disable",
            Self::VerifyFull => "verify-full",
            Self::Omit => "omit",
        }
    }
}

/// User-facing knobs of `connection-string`
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Endpoint type to prefer; read-write when unset
    pub endpoint_type: Option<EndpointType>,
    pub role_name: Option<String>,
    pub database_name: Option<String>,
    pub pooled: bool,
    pub prisma: bool,
    pub ssl: SslMode,
}

/// Everything needed to render a connection URI. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub role: String,
    pub password: String,
    pub database: String,
    pub sslmode: SslMode,
    pub pooled: bool,
    pub prisma: bool,
    pub point: PointInTime,
}

/// Fields printed by `connection-string --extended`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionDetails {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connection_string: String,
}

impl ConnectionTarget {
    /// Render the `postgresql://` URI
    pub fn to_uri(&self) -> Result<String> {
        let mut url = Url::parse(&format!("postgresql://{}", self.host))
            .map_err(|e| CtlError::invalid_input(format!("Invalid endpoint host: {e}")))?;
        url.set_username(&self.role)
            .map_err(|()| CtlError::invalid_input("Cannot set role name on connection string"))?;
        url.set_password(Some(&self.password))
            .map_err(|()| CtlError::invalid_input("Cannot set password on connection string"))?;
        url.set_path(&format!("/{}", self.database));

        {
            let mut query = url.query_pairs_mut();
            match &self.point {
                PointInTime::Head => {}
                PointInTime::Lsn { lsn } => {
                    query.append_pair("options", &format!("neon_lsn:{lsn}"));
                }
                PointInTime::Timestamp { timestamp } => {
                    query.append_pair("options", &format!("neon_timestamp:{timestamp}"));
                }
            }
            if self.prisma {
                query.append_pair("connect_timeout", PRISMA_CONNECT_TIMEOUT);
                query.append_pair("pool_timeout", PRISMA_POOL_TIMEOUT);
                if self.pooled {
                    query.append_pair("pgbouncer", "true");
                }
            }
            if self.sslmode != SslMode::Omit {
                query.append_pair("sslmode", self.sslmode.as_str());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.to_string())
    }

    pub fn details(&self) -> Result<ConnectionDetails> {
        Ok(ConnectionDetails {
            host: self.host.clone(),
            user: self.role.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            connection_string: self.to_uri()?,
        })
    }
}

/// Pick the endpoint of the requested type, else the first one.
pub fn select_endpoint(
    endpoints: &[Endpoint],
    requested: Option<EndpointType>,
) -> Option<&Endpoint> {
    let wanted = requested.unwrap_or(EndpointType::ReadWrite);
    endpoints.iter().find(|e| e.endpoint_type == wanted).or_else(|| endpoints.first())
}

/// Replace the endpoint-ID label of `host` with `label`.
fn replace_id_segment(host: &str, endpoint_id: &str, label: &str) -> String {
    match host.split_once('.') {
        Some((first, rest)) if first == endpoint_id => format!("{label}.{rest}"),
        _ => host.replacen(endpoint_id, label, 1),
    }
}

/// `ep-x` -> `ep-x-pooler`
#[must_use]
pub fn pooled_host(host: &str, endpoint_id: &str) -> String {
    replace_id_segment(host, endpoint_id, &format!("{endpoint_id}-pooler"))
}

/// `ep-x` -> `br-y`
#[must_use]
pub fn point_in_time_host(host: &str, endpoint_id: &str, branch_id: &str) -> String {
    replace_id_segment(host, endpoint_id, branch_id)
}

/// Pick the only candidate or fail naming all of them.
fn single_candidate(names: Vec<String>, kind: &str, flag: &str, branch_id: &str) -> Result<String> {
    match names.len() {
        0 => Err(CtlError::not_found(format!("No {kind}s found for the branch: {branch_id}"))),
        1 => Ok(names.into_iter().next().unwrap_or_default()),
        _ => Err(CtlError::ambiguous(format!(
            "Multiple {kind}s found for the branch, please provide one with the {flag} option: {}",
            names.join(", ")
        ))),
    }
}

/// Assemble a [`ConnectionTarget`] for an already resolved branch.
pub async fn build_connection_target(
    api: &dyn ControlPlane,
    project_id: &str,
    resolved: &ResolvedPointInTime,
    options: &ConnectionOptions,
) -> Result<ConnectionTarget> {
    if options.pooled && !resolved.point.is_head() {
        return Err(CtlError::invalid_input(
            "--pooled cannot be combined with a point-in-time branch",
        ));
    }
    let branch_id = resolved.branch_id.as_str();

    let endpoints = api.list_endpoints(project_id, branch_id).await?;
    let requested = options.endpoint_type.unwrap_or(EndpointType::ReadWrite);
    let endpoint = select_endpoint(&endpoints, options.endpoint_type).ok_or_else(|| {
        CtlError::not_found(format!("No {requested} endpoint found for the branch: {branch_id}"))
    })?;
    debug!(endpoint = %endpoint.id, endpoint_type = %endpoint.endpoint_type, "selected endpoint");

    let role = match &options.role_name {
        Some(name) => name.clone(),
        None => {
            let roles = api.list_roles(project_id, branch_id).await?;
            single_candidate(
                roles.into_iter().map(|r| r.name).collect(),
                "role",
                "--role-name",
                branch_id,
            )?
        }
    };

    let database = match &options.database_name {
        Some(name) => name.clone(),
        None => {
            let databases = api.list_databases(project_id, branch_id).await?;
            single_candidate(
                databases.into_iter().map(|d| d.name).collect(),
                "database",
                "--database-name",
                branch_id,
            )?
        }
    };

    let password = api.get_role_password(project_id, &endpoint.branch_id, &role).await?;

    let host = if options.pooled {
        pooled_host(&endpoint.host, &endpoint.id)
    } else if !resolved.point.is_head() {
        point_in_time_host(&endpoint.host, &endpoint.id, branch_id)
    } else {
        endpoint.host.clone()
    };

    Ok(ConnectionTarget {
        host,
        role,
        password,
        database,
        sslmode: options.ssl,
        pooled: options.pooled,
        prisma: options.prisma,
        point: resolved.point.clone(),
    })
}

/// Parse a branch expression, resolve it, and assemble the target.
///
/// `^self` / `^parent` are meaningless without a target branch and are
/// treated as plain names here.
pub async fn connection_target(
    api: &dyn ControlPlane,
    project_id: &str,
    branch: Option<&str>,
    options: &ConnectionOptions,
) -> Result<ConnectionTarget> {
    let parsed = parse_pit_branch(branch.unwrap_or_default())?;
    if options.pooled && !parsed.point.is_head() {
        return Err(CtlError::invalid_input(
            "--pooled cannot be combined with a point-in-time branch",
        ));
    }

    let branch_id = branch_id_resolve(api, project_id, &parsed.branch).await?;
    let resolved = ResolvedPointInTime { branch_id, point: parsed.point };
    build_connection_target(api, project_id, &resolved, options).await
}
