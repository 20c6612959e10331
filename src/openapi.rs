// src/openapi.rs

use utoipa::OpenApi;

use crate::{
    handlers::{self, assignment, catalog},
    models::{
        assignment::{Assignment, AssignmentStatus},
        mock_test::TestOverview,
        module::{ModuleKind, PublicModule},
        result::ExamResult,
        submission::{AnswerPayload, AutosaveResponse, SubmitResponse, Submission},
    },
};

/// OpenAPI document for the student-facing API, served at `/api/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(title = "IELTS Mock Exam API"),
    paths(
        handlers::health,
        catalog::list_published_tests,
        catalog::start_test,
        assignment::list_mine,
        assignment::validate_token,
        assignment::autosave,
        assignment::submit,
        assignment::get_result,
    ),
    components(schemas(
        Assignment,
        AssignmentStatus,
        TestOverview,
        PublicModule,
        ModuleKind,
        AnswerPayload,
        AutosaveResponse,
        Submission,
        SubmitResponse,
        ExamResult,
    )),
    tags(
        (name = "catalog", description = "Published tests"),
        (name = "assignments", description = "Token access and answer submission"),
    )
)]
pub struct ApiDoc;
