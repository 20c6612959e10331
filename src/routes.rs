// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    handlers::{self, admin, assignment, catalog},
    openapi::ApiDoc,
    state::AppState,
};

/// Assembles the main application router.
///
/// * Student routes (catalog, assignments) need any signed-in principal.
/// * `/api/admin` routes take a `Staff` extractor per handler.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let catalog_routes = Router::new()
        .route("/", get(catalog::list_published_tests))
        .route("/{id}/start", post(catalog::start_test));

    let assignment_routes = Router::new()
        .route("/", get(assignment::list_mine))
        .route("/validate", get(assignment::validate_token))
        .route("/autosave", post(assignment::autosave))
        .route("/submit", post(assignment::submit))
        .route("/result", get(assignment::get_result));

    let admin_routes = Router::new()
        .route("/tests", get(admin::list_tests).post(admin::create_test))
        .route(
            "/tests/{id}",
            get(admin::get_test)
                .put(admin::update_test)
                .delete(admin::delete_test),
        )
        .route("/tests/{id}/modules", post(admin::create_module))
        .route(
            "/modules/{id}",
            put(admin::update_module).delete(admin::delete_module),
        )
        .route(
            "/assignments",
            get(admin::list_assignments).post(admin::issue_assignment),
        )
        .route("/assignments/{id}", get(admin::get_assignment))
        .route("/submissions/{id}/grade", put(admin::grade_submission))
        .route("/sweep", post(admin::run_sweep));

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/tests", catalog_routes)
        .nest("/api/assignments", assignment_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
