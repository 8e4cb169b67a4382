//! Point-in-Time Branch Expressions
//!
//! A branch argument may carry a temporal qualifier after its **last** `@`:
//! - `main` - head of `main`
//! - `main@0/1F56000` - `main` as of an LSN
//! - `main@2021-01-01T00:00:00Z` - `main` as of a timestamp
//!
//! Restore-style commands additionally accept `^self` (the target branch
//! itself) and `^parent` (the target branch's parent) in the branch position.
//! Parsing is pure; only [`resolve_point_in_time`] talks to the control plane.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::api::ControlPlane;
use crate::error::{CtlError, Result};
use crate::formats::{looks_like_lsn, parse_timestamp};
use crate::resolve::branch_id_resolve;

/// Branch token standing for the target branch itself
pub const SELF_TOKEN: &str = "^self";

/// Branch token standing for the target branch's parent
pub const PARENT_TOKEN: &str = "^parent";

/// Temporal tag of a branch expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum PointInTime {
    Head,
    Lsn { lsn: String },
    Timestamp { timestamp: String },
}

impl PointInTime {
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Lsn { .. } => "lsn",
            Self::Timestamp { .. } => "timestamp",
        }
    }

    #[must_use]
    pub const fn is_head(&self) -> bool {
        matches!(self, Self::Head)
    }

    #[must_use]
    pub fn lsn(&self) -> Option<&str> {
        match self {
            Self::Lsn { lsn } => Some(lsn),
            _ => None,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Self::Timestamp { timestamp } => Some(timestamp),
            _ => None,
        }
    }
}

/// A branch expression split into its branch part and temporal tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PitBranch {
    /// Name, ID, special token, or empty for the default branch
    pub branch: String,

    #[serde(flatten)]
    pub point: PointInTime,
}

/// A branch expression whose branch part has been resolved to an ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPointInTime {
    pub branch_id: String,

    #[serde(flatten)]
    pub point: PointInTime,
}

/// Parse a `branch[@qualifier]` expression against the current clock.
pub fn parse_pit_branch(token: &str) -> Result<PitBranch> {
    parse_pit_branch_at(token, Utc::now())
}

/// Parse a `branch[@qualifier]` expression.
///
/// The qualifier is tried as an LSN first, then as a timestamp. Anything else,
/// and any timestamp later than `now`, is rejected.
pub fn parse_pit_branch_at(token: &str, now: DateTime<Utc>) -> Result<PitBranch> {
    let Some((branch, qualifier)) = token.rsplit_once('@') else {
        return Ok(PitBranch { branch: token.to_string(), point: PointInTime::Head });
    };

    let point = if looks_like_lsn(qualifier) {
        PointInTime::Lsn { lsn: qualifier.to_string() }
    } else if let Some(ts) = parse_timestamp(qualifier) {
        if ts > now {
            return Err(CtlError::point_in_time(format!(
                "Timestamp can not be in future - {token}"
            )));
        }
        PointInTime::Timestamp { timestamp: qualifier.to_string() }
    } else {
        return Err(CtlError::point_in_time(format!(
            "Invalid point-in-time qualifier '{qualifier}' in '{token}': \
             expected an LSN (e.g. 0/1F56000) or an ISO-8601 timestamp"
        )));
    };

    Ok(PitBranch { branch: branch.to_string(), point })
}

/// Parse an expression and resolve its branch part relative to a target.
///
/// `^self` resolves to `target_branch_id`; `^parent` costs one fetch of the
/// target branch. Any other branch part goes through [`branch_id_resolve`].
pub async fn resolve_point_in_time(
    api: &dyn ControlPlane,
    project_id: &str,
    target_branch_id: &str,
    expression: &str,
) -> Result<ResolvedPointInTime> {
    let parsed = parse_pit_branch(expression)?;

    let branch_id = match parsed.branch.as_str() {
        SELF_TOKEN => target_branch_id.to_string(),
        PARENT_TOKEN => {
            let target = api.get_branch(project_id, target_branch_id).await?;
            target.parent_id.ok_or_else(|| {
                CtlError::point_in_time(format!(
                    "Branch {target_branch_id} has no parent, '{PARENT_TOKEN}' cannot be used"
                ))
            })?
        }
        other => branch_id_resolve(api, project_id, other).await?,
    };

    debug!(%branch_id, tag = parsed.point.tag(), "resolved point in time");
    Ok(ResolvedPointInTime { branch_id, point: parsed.point })
}
