// src/services/access.rs

use chrono::{DateTime, Utc};

use crate::{
    auth::Principal,
    error::AppError,
    models::assignment::{Assignment, AssignmentStatus},
    store::Store,
};

/// Outcome of presenting an access token.
#[derive(Debug, Clone)]
pub enum Access {
    Valid(Assignment),
    NotFound,
    Expired,
    NotYetActive,
    AlreadyCompleted,
}

impl Access {
    pub fn into_result(self) -> Result<Assignment, AppError> {
        match self {
            Access::Valid(assignment) => Ok(assignment),
            Access::NotFound => Err(AppError::NotFound("Assignment not found".to_string())),
            Access::Expired => Err(AppError::Expired(
                "The access window for this assignment has closed".to_string(),
            )),
            Access::NotYetActive => Err(AppError::NotYetActive(
                "The access window for this assignment has not opened yet".to_string(),
            )),
            Access::AlreadyCompleted => Err(AppError::AlreadyCompleted(
                "This assignment has already been completed".to_string(),
            )),
        }
    }
}

/// Classifies an assignment row at `now`. No side effects.
///
/// A closed window wins over every status, so a swept or never-swept overdue
/// assignment reads the same.
pub fn check_access(assignment: Option<Assignment>, now: DateTime<Utc>) -> Access {
    let Some(assignment) = assignment else {
        return Access::NotFound;
    };

    if assignment.valid_until < now {
        return Access::Expired;
    }

    match assignment.status {
        AssignmentStatus::Completed => Access::AlreadyCompleted,
        AssignmentStatus::Expired => Access::Expired,
        AssignmentStatus::Active if now < assignment.valid_from => Access::NotYetActive,
        AssignmentStatus::Active => Access::Valid(assignment),
    }
}

/// Students only see their own assignments; staff see all of them.
pub fn visible_to(principal: &Principal, assignment: &Assignment) -> bool {
    principal.is_staff() || assignment.student_id == principal.user_id
}

/// Loads the assignment behind `token` if the caller may see it.
pub async fn find_for_principal(
    store: &dyn Store,
    principal: &Principal,
    token: &str,
) -> Result<Option<Assignment>, AppError> {
    let assignment = store.find_assignment_by_token(token).await?;
    Ok(assignment.filter(|a| visible_to(principal, a)))
}

/// Token validation as seen by `principal`.
pub async fn validate_token(
    store: &dyn Store,
    principal: &Principal,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Access, AppError> {
    let assignment = find_for_principal(store, principal, token).await?;
    Ok(check_access(assignment, now))
}
