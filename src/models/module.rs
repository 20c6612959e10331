// src/models/module.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;
use validator::Validate;

/// Question id -> accepted answers.
pub type AnswerKey = HashMap<String, Vec<String>>;

/// IELTS paper a module belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "module_kind", rename_all = "lowercase")]
pub enum ModuleKind {
    Listening,
    Reading,
    Writing,
    Speaking,
}

impl ModuleKind {
    /// Objective modules are scored against their answer key on submission.
    /// The others wait for an instructor to grade them.
    pub fn is_objective(self) -> bool {
        matches!(self, ModuleKind::Listening | ModuleKind::Reading)
    }
}

/// Represents the 'test_modules' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct TestModule {
    pub id: i64,
    pub test_id: i64,
    pub kind: ModuleKind,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
    /// Stored as JSONB. Empty for writing and speaking modules.
    #[schema(value_type = Object)]
    pub answer_key: Json<AnswerKey>,
    pub created_at: DateTime<Utc>,
}

/// DTO for sending a module to students (excludes the answer key).
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicModule {
    pub id: i64,
    pub kind: ModuleKind,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
    pub question_count: usize,
}

impl From<TestModule> for PublicModule {
    fn from(module: TestModule) -> Self {
        Self {
            id: module.id,
            kind: module.kind,
            title: module.title,
            position: module.position,
            duration_minutes: module.duration_minutes,
            question_count: module.answer_key.len(),
        }
    }
}

/// DTO for creating a module inside a test.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateModuleRequest {
    pub kind: ModuleKind,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 0, max = 100))]
    pub position: Option<i32>,
    #[validate(range(min = 1, max = 240))]
    pub duration_minutes: i32,
    #[serde(default)]
    #[validate(custom(function = validate_answer_key))]
    pub answer_key: AnswerKey,
}

/// DTO for updating a module. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub position: Option<i32>,
    #[validate(range(min = 1, max = 240))]
    pub duration_minutes: Option<i32>,
    #[validate(custom(function = validate_answer_key))]
    pub answer_key: Option<AnswerKey>,
}

/// Values for a new 'test_modules' row.
#[derive(Debug, Clone)]
pub struct NewModule {
    pub test_id: i64,
    pub kind: ModuleKind,
    pub title: String,
    pub position: i32,
    pub duration_minutes: i32,
    pub answer_key: AnswerKey,
}

/// Partial update of a 'test_modules' row.
#[derive(Debug, Clone, Default)]
pub struct ModuleChanges {
    pub title: Option<String>,
    pub position: Option<i32>,
    pub duration_minutes: Option<i32>,
    pub answer_key: Option<AnswerKey>,
}

const MAX_QUESTIONS: usize = 200;

fn validate_answer_key(key: &AnswerKey) -> Result<(), validator::ValidationError> {
    if key.len() > MAX_QUESTIONS {
        return Err(validator::ValidationError::new("too_many_questions"));
    }
    for (question, accepted) in key {
        if question.is_empty() || question.len() > 64 {
            return Err(validator::ValidationError::new("invalid_question_id"));
        }
        if accepted.is_empty() {
            return Err(validator::ValidationError::new("question_without_answer"));
        }
        if accepted.iter().any(|a| a.trim().is_empty() || a.len() > 200) {
            return Err(validator::ValidationError::new("invalid_accepted_answer"));
        }
    }
    Ok(())
}
