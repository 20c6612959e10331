// src/models/result.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;

use crate::models::band::Band;

/// Represents the 'exam_results' table in the database.
/// Written once when the assignment completes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ExamResult {
    pub assignment_id: i64,
    /// Module id -> band.
    #[schema(value_type = Object)]
    pub module_bands: Json<BTreeMap<i64, Band>>,
    #[schema(value_type = f64)]
    pub overall_band: Band,
    pub created_at: DateTime<Utc>,
}
