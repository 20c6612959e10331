// src/models/assignment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{result::ExamResult, submission::Submission};

/// Lifecycle state of an assignment. COMPLETED and EXPIRED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "assignment_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Expired,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Expired => "EXPIRED",
        }
    }
}

/// Represents the 'assignments' table in the database.
/// A student's bound attempt at one test.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    pub id: i64,
    pub student_id: i64,
    pub test_id: i64,
    /// Opaque access token, the only credential for the attempt.
    pub token: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }
}

/// Values for a new 'assignments' row.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub student_id: i64,
    pub test_id: i64,
    pub token: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Query filter for the back-office assignment list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentFilter {
    pub status: Option<AssignmentStatus>,
    pub student_id: Option<i64>,
    pub test_id: Option<i64>,
}

/// DTO for staff issuing an assignment on behalf of a student.
#[derive(Debug, Deserialize, Validate)]
pub struct IssueAssignmentRequest {
    #[validate(range(min = 1))]
    pub student_id: i64,
    #[validate(range(min = 1))]
    pub test_id: i64,
}

/// Token carried in a query string.
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TokenQuery {
    /// Assignment access token.
    #[validate(length(min = 1, max = 128))]
    pub token: String,
}

/// Assignment together with everything recorded against it.
#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub submissions: Vec<Submission>,
    pub result: Option<ExamResult>,
}
