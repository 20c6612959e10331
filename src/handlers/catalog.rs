// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    auth::Principal,
    error::AppError,
    models::{
        assignment::Assignment,
        mock_test::TestOverview,
        module::PublicModule,
    },
    services::issuer::{self, IssuePolicy},
    state::AppState,
};

/// Lists published tests with their modules. Answer keys are never sent.
#[utoipa::path(
    get,
    path = "/api/tests",
    tag = "catalog",
    responses((status = 200, description = "Published tests", body = [TestOverview]))
)]
pub async fn list_published_tests(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let tests = store.list_tests(true).await?;

    let mut overviews = Vec::with_capacity(tests.len());
    for test in tests {
        let modules = store
            .list_modules(test.id)
            .await?
            .into_iter()
            .map(PublicModule::from)
            .collect();
        overviews.push(TestOverview {
            id: test.id,
            title: test.title,
            description: test.description,
            modules,
        });
    }

    Ok(Json(overviews))
}

/// Starts a published test for the caller.
///
/// Returns 201 with a new assignment, or 200 with the one already open.
#[utoipa::path(
    post,
    path = "/api/tests/{id}/start",
    tag = "catalog",
    params(("id" = i64, Path, description = "Test id")),
    responses(
        (status = 201, description = "Assignment issued", body = Assignment),
        (status = 200, description = "Open assignment returned", body = Assignment),
        (status = 404, description = "Unknown or unpublished test")
    )
)]
pub async fn start_test(
    State(state): State<AppState>,
    principal: Principal,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();

    let test = store
        .find_test(test_id)
        .await?
        .filter(|test| test.published)
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    let issued = issuer::issue(
        store,
        principal.user_id,
        &test,
        IssuePolicy::from_config(&state.config),
        Utc::now(),
    )
    .await?;

    let status = if issued.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(issued.assignment)))
}
