// src/services/lifecycle.rs

//! Assignment state machine.
//!
//! ```text
//! ACTIVE --(every module submitted and banded)--> COMPLETED
//! ACTIVE --(sweep, now > valid_until)-----------> EXPIRED
//! ```
//!
//! Both targets are terminal. Every transition is a conditional update on
//! `status = 'ACTIVE'` in the store, so concurrent callers get one winner.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
    auth::Principal,
    error::AppError,
    models::{
        assignment::{Assignment, AssignmentDetail, AssignmentStatus},
        band::Band,
        result::ExamResult,
        submission::{AnswerPayload, Submission},
    },
    services::{access, scoring, submissions},
    store::{AssignmentStore, CatalogStore, Store, SubmissionStore},
};

#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub submission: Submission,
    pub completed: bool,
}

/// Loads the caller's assignment for a write. Foreign tokens read as unknown.
async fn resolve(
    store: &dyn Store,
    principal: &Principal,
    token: &str,
) -> Result<Assignment, AppError> {
    access::find_for_principal(store, principal, token)
        .await?
        .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))
}

/// Autosave: overwrite the in-progress answers of one module.
pub async fn autosave(
    store: &dyn Store,
    principal: &Principal,
    payload: &AnswerPayload,
    now: DateTime<Utc>,
) -> Result<Submission, AppError> {
    let assignment = resolve(store, principal, &payload.token).await?;
    submissions::upsert_answers(
        store,
        &assignment,
        payload.module_id,
        &payload.answers,
        payload.time_spent,
        now,
    )
    .await
}

/// Final save of a module. Objective modules are scored on the spot; the
/// assignment completes when this was the last missing band.
pub async fn submit_module(
    store: &dyn Store,
    principal: &Principal,
    payload: &AnswerPayload,
    now: DateTime<Utc>,
) -> Result<ModuleOutcome, AppError> {
    let assignment = resolve(store, principal, &payload.token).await?;
    let module = submissions::module_of(store, &assignment, payload.module_id).await?;

    let saved = submissions::save(
        store,
        &assignment,
        &module,
        &payload.answers,
        payload.time_spent,
        now,
    )
    .await?;

    let (raw_score, band) = if module.kind.is_objective() {
        let score = scoring::score(&payload.answers, &module.answer_key);
        (Some(score.raw as i32), Some(score.band))
    } else {
        (None, None)
    };

    let submission = store
        .finalize_submission(saved.id, raw_score, band, now)
        .await?
        .ok_or_else(|| AppError::Conflict("This module has already been submitted".to_string()))?;

    tracing::info!(
        assignment_id = assignment.id,
        module_id = module.id,
        raw_score = ?submission.raw_score,
        band = ?submission.band,
        "Module submitted"
    );

    let completed = complete_or_check(store, &assignment, now).await?;

    Ok(ModuleOutcome {
        submission,
        completed,
    })
}

/// Instructor band for a submitted writing or speaking module.
pub async fn grade_submission(
    store: &dyn Store,
    submission_id: i64,
    band: Band,
    now: DateTime<Utc>,
) -> Result<ModuleOutcome, AppError> {
    let submission = store
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    let module = store
        .find_module(submission.module_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    if module.kind.is_objective() {
        return Err(AppError::BadRequest(
            "Listening and reading modules are scored automatically".to_string(),
        ));
    }
    if !submission.is_submitted() {
        return Err(AppError::Conflict(
            "This module has not been submitted yet".to_string(),
        ));
    }

    let assignment = store
        .find_assignment(submission.assignment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))?;

    if assignment.status != AssignmentStatus::Active {
        return Err(AppError::NotActive(format!(
            "Assignment is {} and can no longer be graded",
            assignment.status.as_str()
        )));
    }

    let graded = store
        .grade_submission(submission.id, band, now)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    tracing::info!(
        assignment_id = assignment.id,
        submission_id = graded.id,
        %band,
        "Module graded"
    );

    let completed = complete_or_check(store, &assignment, now).await?;

    Ok(ModuleOutcome {
        submission: graded,
        completed,
    })
}

/// Attempts completion; a lost race still reports the stored result.
async fn complete_or_check(
    store: &dyn Store,
    assignment: &Assignment,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    if try_complete(store, assignment, now).await?.is_some() {
        return Ok(true);
    }
    Ok(store.find_result(assignment.id).await?.is_some())
}

/// Completes the assignment when every module of its test has a banded
/// submission. Returns the stored result, or `None` if anything is missing
/// or the assignment already left ACTIVE.
pub async fn try_complete(
    store: &dyn Store,
    assignment: &Assignment,
    now: DateTime<Utc>,
) -> Result<Option<ExamResult>, AppError> {
    let modules = store.list_modules(assignment.test_id).await?;
    if modules.is_empty() {
        return Ok(None);
    }
    let submissions = store.list_submissions(assignment.id).await?;

    let mut module_bands = BTreeMap::new();
    for module in &modules {
        let band = submissions
            .iter()
            .find(|s| s.module_id == module.id && s.is_scored())
            .and_then(|s| s.band);
        match band {
            Some(band) => {
                module_bands.insert(module.id, band);
            }
            None => return Ok(None),
        }
    }

    let bands: Vec<Band> = module_bands.values().copied().collect();
    let Some(overall_band) = scoring::overall_band(&bands) else {
        return Ok(None);
    };

    let result = ExamResult {
        assignment_id: assignment.id,
        module_bands: sqlx::types::Json(module_bands),
        overall_band,
        created_at: now,
    };

    match store.complete_assignment(result.clone(), now).await? {
        Some(_) => {
            tracing::info!(
                assignment_id = assignment.id,
                student_id = assignment.student_id,
                %overall_band,
                "Assignment completed"
            );
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// Expires every ACTIVE assignment past its window. Idempotent.
pub async fn sweep(store: &dyn Store, now: DateTime<Utc>) -> Result<u64, AppError> {
    let expired = store.expire_overdue(now).await?;
    if expired > 0 {
        tracing::info!(expired, "Expiry sweep transitioned assignments");
    } else {
        tracing::debug!("Expiry sweep found nothing to expire");
    }
    Ok(expired)
}

/// Assignment with its submissions and result, for the back office.
pub async fn describe(
    store: &dyn Store,
    assignment_id: i64,
) -> Result<AssignmentDetail, AppError> {
    let assignment = store
        .find_assignment(assignment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))?;
    let submissions = store.list_submissions(assignment.id).await?;
    let result = store.find_result(assignment.id).await?;

    Ok(AssignmentDetail {
        assignment,
        submissions,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        mock_test::{MockTest, NewTest},
        module::{ModuleKind, NewModule, TestModule},
        submission::Answers,
    };
    use crate::services::issuer::{self, IssuePolicy};
    use crate::store::memory::MemoryStore;
    use crate::utils::jwt::Role;
    use chrono::{Duration, TimeZone};

    const S1: Principal = Principal {
        user_id: 1,
        role: Role::Student,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn policy() -> IssuePolicy {
        IssuePolicy {
            validity: Duration::days(7),
        }
    }

    fn answers(entries: &[(&str, &str)]) -> Answers {
        entries
            .iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect()
    }

    fn payload(token: &str, module_id: i64, answers: Answers) -> AnswerPayload {
        AnswerPayload {
            token: token.to_string(),
            module_id,
            answers,
            time_spent: 30,
        }
    }

    struct Fixture {
        test: MockTest,
        listening: TestModule,
        writing: TestModule,
    }

    async fn fixture(store: &MemoryStore) -> Fixture {
        let test = store
            .create_test(NewTest {
                title: "T1".to_string(),
                description: None,
                published: true,
            })
            .await
            .unwrap();
        let listening = store
            .create_module(NewModule {
                test_id: test.id,
                kind: ModuleKind::Listening,
                title: "Listening".to_string(),
                position: 0,
                duration_minutes: 30,
                answer_key: [
                    ("q1".to_string(), vec!["B".to_string()]),
                    ("q2".to_string(), vec!["C".to_string()]),
                ]
                .into(),
            })
            .await
            .unwrap();
        let writing = store
            .create_module(NewModule {
                test_id: test.id,
                kind: ModuleKind::Writing,
                title: "Writing".to_string(),
                position: 1,
                duration_minutes: 60,
                answer_key: Default::default(),
            })
            .await
            .unwrap();
        Fixture {
            test,
            listening,
            writing,
        }
    }

    #[tokio::test]
    async fn autosave_scenario_keeps_one_row_with_latest_answers() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let token = issued.assignment.token.clone();
        assert_eq!(issued.assignment.status, AssignmentStatus::Active);

        let first = autosave(
            &store,
            &S1,
            &payload(&token, fx.listening.id, answers(&[("q1", "A")])),
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();
        assert_eq!(first.answers.0, answers(&[("q1", "A")]));

        let second = autosave(
            &store,
            &S1,
            &payload(&token, fx.listening.id, answers(&[("q1", "B"), ("q2", "C")])),
            t0() + Duration::hours(2),
        )
        .await
        .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.answers.0, answers(&[("q1", "B"), ("q2", "C")]));
        assert_eq!(
            store.submission_rows(issued.assignment.id, fx.listening.id),
            1
        );
    }

    #[tokio::test]
    async fn sweep_expires_and_blocks_autosave() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();

        let expired = sweep(&store, t0() + Duration::days(8)).await.unwrap();
        assert_eq!(expired, 1);

        let row = store
            .find_assignment(issued.assignment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, AssignmentStatus::Expired);

        let err = autosave(
            &store,
            &S1,
            &payload(&issued.assignment.token, fx.listening.id, answers(&[("q1", "A")])),
            t0() + Duration::days(8),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotActive(_)));
    }

    #[tokio::test]
    async fn sweep_is_idempotent_and_ignores_open_windows() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        issuer::issue(&store, 1, &fx.test, policy(), t0()).await.unwrap();
        issuer::issue(&store, 2, &fx.test, policy(), t0() + Duration::days(5))
            .await
            .unwrap();

        let at = t0() + Duration::days(8);
        assert_eq!(sweep(&store, at).await.unwrap(), 1);
        assert_eq!(sweep(&store, at).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn foreign_token_reads_as_not_found() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let intruder = Principal {
            user_id: 2,
            role: Role::Student,
        };

        let err = autosave(
            &store,
            &intruder,
            &payload(&issued.assignment.token, fx.listening.id, Answers::new()),
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_completes_after_grading() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let token = issued.assignment.token.clone();

        let listening = submit_module(
            &store,
            &S1,
            &payload(&token, fx.listening.id, answers(&[("q1", "b"), ("q2", "C")])),
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();
        assert_eq!(listening.submission.raw_score, Some(2));
        assert_eq!(listening.submission.band, Band::from_f64(9.0));
        assert!(!listening.completed);

        let writing = submit_module(
            &store,
            &S1,
            &payload(&token, fx.writing.id, answers(&[("task1", "An essay")])),
            t0() + Duration::hours(2),
        )
        .await
        .unwrap();
        assert_eq!(writing.submission.band, None);
        assert!(!writing.completed);

        // frozen after submission
        let err = autosave(
            &store,
            &S1,
            &payload(&token, fx.writing.id, Answers::new()),
            t0() + Duration::hours(3),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let graded = grade_submission(
            &store,
            writing.submission.id,
            Band::from_f64(6.0).unwrap(),
            t0() + Duration::days(1),
        )
        .await
        .unwrap();
        assert!(graded.completed);

        let detail = describe(&store, issued.assignment.id).await.unwrap();
        assert_eq!(detail.assignment.status, AssignmentStatus::Completed);
        let result = detail.result.unwrap();
        // (9.0 + 6.0) / 2 = 7.5
        assert_eq!(result.overall_band, Band::from_f64(7.5).unwrap());
        assert_eq!(result.module_bands.0.len(), 2);

        let access = access::validate_token(&store, &S1, &token, t0() + Duration::days(2))
            .await
            .unwrap();
        assert!(matches!(access, access::Access::AlreadyCompleted));
    }

    #[tokio::test]
    async fn objective_modules_cannot_be_graded_by_hand() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let outcome = submit_module(
            &store,
            &S1,
            &payload(&issued.assignment.token, fx.listening.id, Answers::new()),
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.submission.band, Some(Band::MIN));

        let err = grade_submission(&store, outcome.submission.id, Band::MAX, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn sweep_spares_assignments_awaiting_grading() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let token = issued.assignment.token.clone();
        for module_id in [fx.listening.id, fx.writing.id] {
            submit_module(&store, &S1, &payload(&token, module_id, Answers::new()), t0())
                .await
                .unwrap();
        }

        assert_eq!(sweep(&store, t0() + Duration::days(30)).await.unwrap(), 0);

        let writing = store
            .list_submissions(issued.assignment.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.module_id == fx.writing.id)
            .unwrap();
        let graded = grade_submission(
            &store,
            writing.id,
            Band::from_f64(5.5).unwrap(),
            t0() + Duration::days(30),
        )
        .await
        .unwrap();
        assert!(graded.completed);
    }

    #[tokio::test]
    async fn restart_after_window_keeps_attempt_awaiting_grading() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        let token = issued.assignment.token.clone();
        for module_id in [fx.listening.id, fx.writing.id] {
            submit_module(&store, &S1, &payload(&token, module_id, Answers::new()), t0())
                .await
                .unwrap();
        }

        let late = t0() + Duration::days(9);
        assert_eq!(sweep(&store, late).await.unwrap(), 0);

        let again = issuer::issue(&store, S1.user_id, &fx.test, policy(), late)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.assignment.id, issued.assignment.id);
        assert_eq!(again.assignment.status, AssignmentStatus::Active);

        let writing = store
            .list_submissions(issued.assignment.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.module_id == fx.writing.id)
            .unwrap();
        let graded = grade_submission(&store, writing.id, Band::from_f64(6.0).unwrap(), late)
            .await
            .unwrap();
        assert!(graded.completed);
    }

    #[tokio::test]
    async fn restart_after_window_replaces_unfinished_attempt() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        submit_module(
            &store,
            &S1,
            &payload(&issued.assignment.token, fx.listening.id, Answers::new()),
            t0(),
        )
        .await
        .unwrap();

        let late = t0() + Duration::days(9);
        let again = issuer::issue(&store, S1.user_id, &fx.test, policy(), late)
            .await
            .unwrap();
        assert!(again.created);
        assert_ne!(again.assignment.id, issued.assignment.id);

        let old = store
            .find_assignment(issued.assignment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.status, AssignmentStatus::Expired);
    }

    #[tokio::test]
    async fn expired_assignment_cannot_complete() {
        let store = MemoryStore::new();
        let fx = fixture(&store).await;
        let issued = issuer::issue(&store, S1.user_id, &fx.test, policy(), t0())
            .await
            .unwrap();
        store
            .expire_assignment(issued.assignment.id, t0() + Duration::days(8))
            .await
            .unwrap();

        let result = try_complete(&store, &issued.assignment, t0() + Duration::days(8))
            .await
            .unwrap();
        assert!(result.is_none());
        let row = store
            .find_assignment(issued.assignment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, AssignmentStatus::Expired);
    }
}
