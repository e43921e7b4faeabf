//! Idempotency guard - existence checks in front of create and delete calls
//!
//! Lookups are live; nothing is cached between calls. A failed lookup on the
//! creation side propagates. On the removal side only `NotFound` is absorbed.

use crate::control_plane::{ControlPlane, ControlPlaneError, ControlPlaneResult};
use crate::resource::RoleAssignment;
use crate::template::MaterializedRole;

/// What a guarded call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Created,
    Updated,
    /// The object was already present
    Skipped,
    Deleted,
    /// The object was already absent
    NotFound,
}

/// Create the custom role, or update it in place when one with the same name exists
pub async fn ensure_role_definition<C>(
    client: &C,
    role: &MaterializedRole,
) -> ControlPlaneResult<GuardOutcome>
where
    C: ControlPlane + ?Sized,
{
    let existing = client.list_role_definitions(role.name()).await?;

    if existing.iter().any(|r| r.name == role.name()) {
        log::debug!("role '{}' exists, updating in place", role.name());
        client.update_role_definition(role).await?;
        Ok(GuardOutcome::Updated)
    } else {
        client.create_role_definition(role).await?;
        Ok(GuardOutcome::Created)
    }
}

/// Create the assignment unless the (principal, role, scope) triple already exists
pub async fn ensure_role_assignment<C>(
    client: &C,
    assignment: &RoleAssignment,
) -> ControlPlaneResult<GuardOutcome>
where
    C: ControlPlane + ?Sized,
{
    let existing = client.list_role_assignments(assignment).await?;

    if existing.iter().any(|a| a == assignment) {
        log::debug!(
            "role '{}' already assigned to {}",
            assignment.role,
            assignment.principal_id
        );
        return Ok(GuardOutcome::Skipped);
    }

    client.create_role_assignment(assignment).await?;
    Ok(GuardOutcome::Created)
}

/// Delete an assignment, reporting `NotFound` when it is already gone
pub async fn remove_role_assignment<C>(
    client: &C,
    assignment: &RoleAssignment,
) -> ControlPlaneResult<GuardOutcome>
where
    C: ControlPlane + ?Sized,
{
    let existing = match client.list_role_assignments(assignment).await {
        Ok(existing) => existing,
        Err(e) if e.is_not_found() => return Ok(GuardOutcome::NotFound),
        Err(e) => return Err(e),
    };

    if !existing.iter().any(|a| a == assignment) {
        return Ok(GuardOutcome::NotFound);
    }

    tolerate_not_found(client.delete_role_assignment(assignment).await)
}

/// Map a deletion result so that `NotFound` counts as already removed
pub fn tolerate_not_found(result: ControlPlaneResult<()>) -> ControlPlaneResult<GuardOutcome> {
    match result {
        Ok(()) => Ok(GuardOutcome::Deleted),
        Err(ControlPlaneError::NotFound(message)) => {
            log::info!("already absent: {}", message);
            Ok(GuardOutcome::NotFound)
        }
        Err(e) => Err(e),
    }
}
