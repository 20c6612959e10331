// src/handlers/assignment.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use validator::Validate;

use crate::{
    auth::Principal,
    error::AppError,
    extract::{AppJson, AppQuery},
    models::{
        assignment::{Assignment, AssignmentFilter, TokenQuery},
        result::ExamResult,
        submission::{AnswerPayload, AutosaveResponse, SubmitResponse},
    },
    services::{access, lifecycle},
    state::AppState,
};

/// Lists the caller's own assignments, newest first.
#[utoipa::path(
    get,
    path = "/api/assignments",
    tag = "assignments",
    responses((status = 200, description = "Caller's assignments", body = [Assignment]))
)]
pub async fn list_mine(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let filter = AssignmentFilter {
        student_id: Some(principal.user_id),
        ..Default::default()
    };
    let assignments = state.store.list_assignments(&filter).await?;

    Ok(Json(assignments))
}

/// Checks whether a token currently grants access.
#[utoipa::path(
    get,
    path = "/api/assignments/validate",
    tag = "assignments",
    params(TokenQuery),
    responses(
        (status = 200, description = "Access granted", body = Assignment),
        (status = 404, description = "Unknown token"),
        (status = 410, description = "Access window closed"),
        (status = 403, description = "Access window not open yet"),
        (status = 409, description = "Assignment already completed")
    )
)]
pub async fn validate_token(
    State(state): State<AppState>,
    principal: Principal,
    AppQuery(query): AppQuery<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;

    let assignment =
        access::validate_token(state.store.as_ref(), &principal, &query.token, Utc::now())
            .await?
            .into_result()?;

    Ok(Json(assignment))
}

/// Autosaves the answers of one module (last write wins).
#[utoipa::path(
    post,
    path = "/api/assignments/autosave",
    tag = "assignments",
    request_body = AnswerPayload,
    responses(
        (status = 200, description = "Saved", body = AutosaveResponse),
        (status = 404, description = "Unknown token or module"),
        (status = 409, description = "Assignment not active or module already submitted"),
        (status = 410, description = "Access window closed")
    )
)]
pub async fn autosave(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<AnswerPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    lifecycle::autosave(state.store.as_ref(), &principal, &payload, Utc::now()).await?;

    Ok(Json(AutosaveResponse { success: true }))
}

/// Hands a module in. Listening and reading are scored immediately.
#[utoipa::path(
    post,
    path = "/api/assignments/submit",
    tag = "assignments",
    request_body = AnswerPayload,
    responses(
        (status = 200, description = "Module submitted", body = SubmitResponse),
        (status = 404, description = "Unknown token or module"),
        (status = 409, description = "Assignment not active or module already submitted"),
        (status = 410, description = "Access window closed")
    )
)]
pub async fn submit(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<AnswerPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let outcome =
        lifecycle::submit_module(state.store.as_ref(), &principal, &payload, Utc::now()).await?;

    Ok(Json(SubmitResponse {
        submission: outcome.submission,
        completed: outcome.completed,
    }))
}

/// Returns the bands of a completed assignment.
#[utoipa::path(
    get,
    path = "/api/assignments/result",
    tag = "assignments",
    params(TokenQuery),
    responses(
        (status = 200, description = "Result", body = ExamResult),
        (status = 404, description = "Unknown token or result not ready")
    )
)]
pub async fn get_result(
    State(state): State<AppState>,
    principal: Principal,
    AppQuery(query): AppQuery<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;

    let store = state.store.as_ref();
    let assignment = access::find_for_principal(store, &principal, &query.token)
        .await?
        .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))?;

    let result = store
        .find_result(assignment.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Result is not available yet".to_string()))?;

    Ok(Json(result))
}
