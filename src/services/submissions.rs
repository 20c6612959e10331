// src/services/submissions.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        assignment::{Assignment, AssignmentStatus},
        module::TestModule,
        submission::{Answers, Submission, UpsertSubmission},
    },
    store::Store,
};

/// Rejects writes to an assignment that is not ACTIVE or not in its window.
pub fn ensure_accepting(assignment: &Assignment, now: DateTime<Utc>) -> Result<(), AppError> {
    if assignment.status != AssignmentStatus::Active {
        return Err(AppError::NotActive(format!(
            "Assignment is {} and no longer accepts answers",
            assignment.status.as_str()
        )));
    }
    if now > assignment.valid_until {
        return Err(AppError::Expired(
            "The access window for this assignment has closed".to_string(),
        ));
    }
    if now < assignment.valid_from {
        return Err(AppError::NotYetActive(
            "The access window for this assignment has not opened yet".to_string(),
        ));
    }
    Ok(())
}

/// Loads a module and checks it belongs to the assignment's test.
pub async fn module_of(
    store: &dyn Store,
    assignment: &Assignment,
    module_id: i64,
) -> Result<TestModule, AppError> {
    store
        .find_module(module_id)
        .await?
        .filter(|module| module.test_id == assignment.test_id)
        .ok_or_else(|| AppError::NotFound("Module not found in this test".to_string()))
}

/// Create-or-overwrite of the answers for one module. Last write wins.
pub async fn upsert_answers(
    store: &dyn Store,
    assignment: &Assignment,
    module_id: i64,
    answers: &Answers,
    time_spent_secs: i32,
    now: DateTime<Utc>,
) -> Result<Submission, AppError> {
    let module = module_of(store, assignment, module_id).await?;
    save(store, assignment, &module, answers, time_spent_secs, now).await
}

/// Same as [`upsert_answers`] for an already resolved module.
pub async fn save(
    store: &dyn Store,
    assignment: &Assignment,
    module: &TestModule,
    answers: &Answers,
    time_spent_secs: i32,
    now: DateTime<Utc>,
) -> Result<Submission, AppError> {
    ensure_accepting(assignment, now)?;

    let upsert = UpsertSubmission {
        assignment_id: assignment.id,
        module_id: module.id,
        answers: answers.clone(),
        time_spent_secs,
        now,
    };

    match store.upsert_submission(upsert).await? {
        Some(submission) => Ok(submission),
        None => Err(explain_rejection(store, assignment.id, now).await),
    }
}

/// The guarded upsert wrote nothing: either the assignment changed state
/// since it was loaded, or the module was already handed in.
async fn explain_rejection(store: &dyn Store, assignment_id: i64, now: DateTime<Utc>) -> AppError {
    match store.find_assignment(assignment_id).await {
        Ok(Some(fresh)) => match ensure_accepting(&fresh, now) {
            Err(err) => err,
            Ok(()) => AppError::Conflict("This module has already been submitted".to_string()),
        },
        Ok(None) => AppError::NotFound("Assignment not found".to_string()),
        Err(err) => AppError::from(err),
    }
}
