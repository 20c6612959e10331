// src/models/submission.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::band::Band;

/// Question id -> the candidate's answer.
pub type Answers = HashMap<String, String>;

/// Represents the 'submissions' table in the database.
/// One row per (assignment, module); the payload is overwritten by autosaves.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    pub id: i64,
    pub assignment_id: i64,
    pub module_id: i64,
    #[schema(value_type = Object)]
    pub answers: Json<Answers>,
    pub time_spent_secs: i32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the candidate hands the module in. Payload is frozen afterwards.
    pub submitted_at: Option<DateTime<Utc>>,
    pub raw_score: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub band: Option<Band>,
}

impl Submission {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    pub fn is_scored(&self) -> bool {
        self.is_submitted() && self.band.is_some()
    }
}

/// DTO for autosaving or submitting a module's answers.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnswerPayload {
    #[validate(length(min = 1, max = 128))]
    pub token: String,
    #[validate(range(min = 1))]
    pub module_id: i64,
    #[serde(default)]
    #[validate(custom(function = validate_answers))]
    pub answers: Answers,
    /// Seconds the candidate has spent on the module so far.
    #[serde(default)]
    #[validate(range(min = 0, max = 86400))]
    pub time_spent: i32,
}

/// DTO for an instructor grading a writing or speaking module.
#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub band: Band,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AutosaveResponse {
    pub success: bool,
}

/// Outcome of submitting or grading a module.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub submission: Submission,
    /// True once every module is scored and the result exists.
    pub completed: bool,
}

/// Values for the create-or-overwrite of a submission row.
#[derive(Debug, Clone)]
pub struct UpsertSubmission {
    pub assignment_id: i64,
    pub module_id: i64,
    pub answers: Answers,
    pub time_spent_secs: i32,
    pub now: DateTime<Utc>,
}

const MAX_ANSWERS: usize = 200;
// Writing tasks are free text essays.
const MAX_ANSWER_LEN: usize = 20_000;

fn validate_answers(answers: &Answers) -> Result<(), validator::ValidationError> {
    if answers.len() > MAX_ANSWERS {
        return Err(validator::ValidationError::new("too_many_answers"));
    }
    for (question, answer) in answers {
        if question.is_empty() || question.len() > 64 {
            return Err(validator::ValidationError::new("invalid_question_id"));
        }
        if answer.len() > MAX_ANSWER_LEN {
            return Err(validator::ValidationError::new("answer_too_long"));
        }
    }
    Ok(())
}
