// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    auth::Staff,
    error::AppError,
    extract::{AppJson, AppQuery},
    models::{
        assignment::{AssignmentFilter, IssueAssignmentRequest},
        mock_test::{CreateTestRequest, NewTest, TestChanges, TestDetail, UpdateTestRequest},
        module::{CreateModuleRequest, ModuleChanges, ModuleKind, NewModule, UpdateModuleRequest},
        submission::{GradeRequest, SubmitResponse},
    },
    services::{
        issuer::{self, IssuePolicy},
        lifecycle,
    },
    state::AppState,
    store::Store,
    utils::html::{clean_html, clean_optional},
};

/// Lists every test, published or not.
/// Staff only.
pub async fn list_tests(
    State(state): State<AppState>,
    _staff: Staff,
) -> Result<impl IntoResponse, AppError> {
    let tests = state.store.list_tests(false).await?;
    Ok(Json(tests))
}

/// Creates a test. New tests start unpublished unless asked otherwise,
/// but a test cannot be published before it has modules.
pub async fn create_test(
    State(state): State<AppState>,
    Staff(staff): Staff,
    AppJson(payload): AppJson<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.published {
        return Err(AppError::BadRequest(
            "Add modules before publishing a test".to_string(),
        ));
    }

    let test = state
        .store
        .create_test(NewTest {
            title: clean_html(&payload.title),
            description: clean_optional(payload.description.as_deref())
                .filter(|description| !description.is_empty()),
            published: false,
        })
        .await?;

    tracing::info!(staff_id = staff.user_id, test_id = test.id, "Created test");

    Ok((StatusCode::CREATED, Json(test)))
}

/// Returns a test with its modules, answer keys included.
pub async fn get_test(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let test = store
        .find_test(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
    let modules = store.list_modules(test.id).await?;

    Ok(Json(TestDetail { test, modules }))
}

/// Updates a test. Fields are optional.
pub async fn update_test(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let store = state.store.as_ref();

    if payload.published == Some(true) && store.list_modules(id).await?.is_empty() {
        return Err(AppError::BadRequest(
            "Add modules before publishing a test".to_string(),
        ));
    }

    let changes = TestChanges {
        title: payload.title.as_deref().map(clean_html),
        description: clean_optional(payload.description.as_deref()),
        published: payload.published,
    };

    let test = store
        .update_test(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    tracing::info!(staff_id = staff.user_id, test_id = test.id, "Updated test");

    Ok(Json(test))
}

/// Deletes a test that nobody has attempted yet.
/// Admin only.
pub async fn delete_test(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    staff.require_admin()?;
    let store = state.store.as_ref();

    ensure_no_assignments(store, id).await?;

    if !store.delete_test(id).await? {
        return Err(AppError::NotFound("Test not found".to_string()));
    }

    tracing::info!(staff_id = staff.user_id, test_id = id, "Deleted test");

    Ok(StatusCode::NO_CONTENT)
}

/// Adds a module to a test.
pub async fn create_module(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(test_id): Path<i64>,
    AppJson(payload): AppJson<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let store = state.store.as_ref();

    store
        .find_test(test_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
    ensure_no_assignments(store, test_id).await?;
    check_answer_key(payload.kind, payload.answer_key.is_empty())?;

    let position = match payload.position {
        Some(position) => position,
        None => store.list_modules(test_id).await?.len() as i32,
    };

    let module = store
        .create_module(NewModule {
            test_id,
            kind: payload.kind,
            title: clean_html(&payload.title),
            position,
            duration_minutes: payload.duration_minutes,
            answer_key: payload.answer_key,
        })
        .await?;

    tracing::info!(
        staff_id = staff.user_id,
        test_id,
        module_id = module.id,
        kind = ?module.kind,
        "Created module"
    );

    Ok((StatusCode::CREATED, Json(module)))
}

/// Updates a module. The answer key is locked once the test has assignments.
pub async fn update_module(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let store = state.store.as_ref();

    let module = store
        .find_module(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    if let Some(key) = &payload.answer_key {
        ensure_no_assignments(store, module.test_id).await?;
        check_answer_key(module.kind, key.is_empty())?;
    }

    let changes = ModuleChanges {
        title: payload.title.as_deref().map(clean_html),
        position: payload.position,
        duration_minutes: payload.duration_minutes,
        answer_key: payload.answer_key,
    };

    let module = store
        .update_module(id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;

    tracing::info!(staff_id = staff.user_id, module_id = module.id, "Updated module");

    Ok(Json(module))
}

/// Removes a module from a test nobody has attempted yet.
pub async fn delete_module(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();

    let module = store
        .find_module(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))?;
    ensure_no_assignments(store, module.test_id).await?;

    store.delete_module(id).await?;

    tracing::info!(staff_id = staff.user_id, module_id = id, "Deleted module");

    Ok(StatusCode::NO_CONTENT)
}

/// Lists assignments, optionally filtered by status, student or test.
pub async fn list_assignments(
    State(state): State<AppState>,
    _staff: Staff,
    AppQuery(filter): AppQuery<AssignmentFilter>,
) -> Result<impl IntoResponse, AppError> {
    let assignments = state.store.list_assignments(&filter).await?;
    Ok(Json(assignments))
}

/// Issues an assignment for a student. Unpublished tests are allowed here so
/// staff can trial a test before releasing it.
pub async fn issue_assignment(
    State(state): State<AppState>,
    Staff(staff): Staff,
    AppJson(payload): AppJson<IssueAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let store = state.store.as_ref();

    let test = store
        .find_test(payload.test_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    let issued = issuer::issue(
        store,
        payload.student_id,
        &test,
        IssuePolicy::from_config(&state.config),
        Utc::now(),
    )
    .await?;

    tracing::info!(
        staff_id = staff.user_id,
        assignment_id = issued.assignment.id,
        created = issued.created,
        "Staff issued assignment"
    );

    let status = if issued.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(issued.assignment)))
}

/// Returns an assignment with its submissions and result.
pub async fn get_assignment(
    State(state): State<AppState>,
    _staff: Staff,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = lifecycle::describe(state.store.as_ref(), id).await?;
    Ok(Json(detail))
}

/// Sets the band of a submitted writing or speaking module.
pub async fn grade_submission(
    State(state): State<AppState>,
    Staff(staff): Staff,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<GradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome =
        lifecycle::grade_submission(state.store.as_ref(), id, payload.band, Utc::now()).await?;

    tracing::info!(
        staff_id = staff.user_id,
        submission_id = id,
        completed = outcome.completed,
        "Graded submission"
    );

    Ok(Json(SubmitResponse {
        submission: outcome.submission,
        completed: outcome.completed,
    }))
}

/// Runs the expiry sweep now. Meant for an external scheduler.
pub async fn run_sweep(
    State(state): State<AppState>,
    _staff: Staff,
) -> Result<impl IntoResponse, AppError> {
    let expired = lifecycle::sweep(state.store.as_ref(), Utc::now()).await?;
    Ok(Json(json!({ "expired": expired })))
}

async fn ensure_no_assignments(store: &dyn Store, test_id: i64) -> Result<(), AppError> {
    if store.count_assignments_for_test(test_id).await? > 0 {
        return Err(AppError::Conflict(
            "Test already has assignments; its structure is locked".to_string(),
        ));
    }
    Ok(())
}

/// Objective modules need a key to be scored; subjective ones must not carry one.
fn check_answer_key(kind: ModuleKind, key_is_empty: bool) -> Result<(), AppError> {
    match (kind.is_objective(), key_is_empty) {
        (true, true) => Err(AppError::BadRequest(
            "Listening and reading modules need an answer key".to_string(),
        )),
        (false, false) => Err(AppError::BadRequest(
            "Writing and speaking modules are graded by instructors and take no answer key"
                .to_string(),
        )),
        _ => Ok(()),
    }
}
