use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::DifficultyLevel;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) is_admin: bool,
    pub(crate) is_active: bool,
    pub(crate) completed_all: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Parametrized problem definition. `variables` and `answer_units` are
/// comma-separated lists; `problem_text` uses `__name__` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ProblemTemplate {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) problem_text: String,
    pub(crate) variables: String,
    pub(crate) solution_formula: String,
    pub(crate) answer_count: i32,
    pub(crate) answer_units: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) image_filename: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
