// src/services/issuer.rs

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::Config,
    error::AppError,
    models::{
        assignment::{Assignment, NewAssignment},
        mock_test::MockTest,
    },
    store::{AssignmentStore, CatalogStore, Store},
};

/// Attempts to insert before giving up on a contended (student, test) pair.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// How long a freshly issued assignment stays open.
#[derive(Debug, Clone, Copy)]
pub struct IssuePolicy {
    pub validity: Duration,
}

impl IssuePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            validity: Duration::days(config.assignment_validity_days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Issued {
    pub assignment: Assignment,
    /// False when an open assignment already existed and was returned as is.
    pub created: bool,
}

/// 128 random bits as 32 lowercase hex characters.
pub fn mint_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Issues (or returns the open) assignment of `test` for `student_id`.
///
/// Starting is idempotent: an ACTIVE assignment still inside its window is
/// returned unchanged. One that is already past its window is expired first
/// so the student gets a fresh attempt, unless all of its modules are handed
/// in: that attempt waits for grading and is returned as is.
pub async fn issue(
    store: &dyn Store,
    student_id: i64,
    test: &MockTest,
    policy: IssuePolicy,
    now: DateTime<Utc>,
) -> Result<Issued, AppError> {
    if store.list_modules(test.id).await?.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Test {} has no modules yet",
            test.id
        )));
    }

    for _ in 0..MAX_ISSUE_ATTEMPTS {
        if let Some(existing) = store.find_active_assignment(student_id, test.id).await? {
            if now <= existing.valid_until {
                return Ok(Issued {
                    assignment: existing,
                    created: false,
                });
            }
            if store.expire_assignment(existing.id, now).await?.is_some() {
                tracing::info!(
                    assignment_id = existing.id,
                    student_id,
                    test_id = test.id,
                    "Expired overdue assignment before reissuing"
                );
            } else if let Some(pending) = store
                .find_active_assignment(student_id, test.id)
                .await?
                .filter(|a| a.id == existing.id)
            {
                // Every module is handed in; the attempt waits for grading.
                return Ok(Issued {
                    assignment: pending,
                    created: false,
                });
            }
        }

        let new = NewAssignment {
            student_id,
            test_id: test.id,
            token: mint_token(),
            valid_from: now,
            valid_until: now + policy.validity,
        };

        // None means a concurrent start won the race; loop to pick it up.
        if let Some(assignment) = store.insert_assignment(new).await? {
            tracing::info!(
                assignment_id = assignment.id,
                student_id,
                test_id = test.id,
                valid_until = %assignment.valid_until,
                "Issued assignment"
            );
            return Ok(Issued {
                assignment,
                created: true,
            });
        }
    }

    Err(AppError::Conflict(
        "Could not start the test, please retry".to_string(),
    ))
}
