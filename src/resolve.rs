//! Identifier Resolution
//!
//! Turns human-friendly identifiers into the opaque IDs the control plane
//! expects.
//!
//! # Branch Resolution
//! 1. Empty token: the project's default branch (one listing call)
//! 2. Token shaped like a branch ID: returned unchanged, no network call
//! 3. Anything else: exact, case-sensitive name match against one listing
//!
//! # Project Resolution Precedence
//! 1. Explicit `--project-id` (highest priority)
//! 2. Context file written by `set-context`
//! 3. The only project the account owns

use tracing::debug;

use crate::api::ControlPlane;
use crate::error::{CtlError, Result};
use crate::formats::looks_like_branch_id;

/// Resolve a branch token (name, ID, or empty) to a branch ID.
///
/// An ID-shaped token is trusted as-is; the downstream call validates it.
pub async fn branch_id_resolve(
    api: &dyn ControlPlane,
    project_id: &str,
    branch: &str,
) -> Result<String> {
    if branch.is_empty() {
        let branches = api.list_branches(project_id).await?;
        return branches
            .into_iter()
            .find(crate::api::Branch::is_default)
            .map(|b| b.id)
            .ok_or_else(|| CtlError::not_found("No default branch found"));
    }

    if looks_like_branch_id(branch) {
        debug!(branch, "token looks like a branch id, skipping lookup");
        return Ok(branch.to_string());
    }

    let branches = api.list_branches(project_id).await?;
    if let Some(found) = branches.iter().find(|b| b.name == branch) {
        debug!(branch, id = %found.id, "resolved branch name");
        return Ok(found.id.clone());
    }

    let available: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
    Err(CtlError::not_found(format!(
        "Branch {branch} not found.\nAvailable branches: {}",
        available.join(", ")
    )))
}

/// Resolve the project ID following the documented precedence.
pub async fn project_id_resolve(
    api: &dyn ControlPlane,
    explicit: Option<&str>,
    from_context: Option<&str>,
) -> Result<String> {
    if let Some(id) = explicit.filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    if let Some(id) = from_context.filter(|id| !id.is_empty()) {
        debug!(project_id = id, "using project from context file");
        return Ok(id.to_string());
    }

    let mut projects = api.list_projects().await?;
    match projects.len() {
        0 => Err(CtlError::not_found("No projects found")),
        1 => Ok(projects.remove(0).id),
        _ => Err(CtlError::ambiguous(
            "Multiple projects found, please provide one with the --project-id option",
        )),
    }
}
