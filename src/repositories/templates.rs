use sqlx::PgPool;

use crate::db::models::ProblemTemplate;
use crate::db::types::DifficultyLevel;

const COLUMNS: &str = "\
    id, name, problem_text, variables, solution_formula, answer_count, answer_units, \
    difficulty, image_filename, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ProblemTemplate>, sqlx::Error> {
    sqlx::query_as::<_, ProblemTemplate>(&format!(
        "SELECT {COLUMNS} FROM problem_templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list(pool: &PgPool) -> Result<Vec<ProblemTemplate>, sqlx::Error> {
    sqlx::query_as::<_, ProblemTemplate>(&format!(
        "SELECT {COLUMNS} FROM problem_templates ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_ids(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM problem_templates ORDER BY id")
        .fetch_all(pool)
        .await
}

pub(crate) async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM problem_templates").fetch_one(pool).await
}

pub(crate) struct CreateTemplate<'a> {
    pub name: &'a str,
    pub problem_text: &'a str,
    pub variables: &'a str,
    pub solution_formula: &'a str,
    pub answer_count: i32,
    pub answer_units: Option<&'a str>,
    pub difficulty: DifficultyLevel,
    pub image_filename: Option<&'a str>,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateTemplate<'_>,
) -> Result<ProblemTemplate, sqlx::Error> {
    sqlx::query_as::<_, ProblemTemplate>(&format!(
        "INSERT INTO problem_templates (
            name, problem_text, variables, solution_formula, answer_count,
            answer_units, difficulty, image_filename, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING {COLUMNS}",
    ))
    .bind(params.name)
    .bind(params.problem_text)
    .bind(params.variables)
    .bind(params.solution_formula)
    .bind(params.answer_count)
    .bind(params.answer_units)
    .bind(params.difficulty)
    .bind(params.image_filename)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) struct UpdateTemplate {
    pub name: Option<String>,
    pub problem_text: Option<String>,
    pub variables: Option<String>,
    pub solution_formula: Option<String>,
    pub answer_count: Option<i32>,
    pub answer_units: Option<String>,
    pub difficulty: Option<DifficultyLevel>,
    pub image_filename: Option<String>,
    pub updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: i64,
    params: UpdateTemplate,
) -> Result<Option<ProblemTemplate>, sqlx::Error> {
    sqlx::query_as::<_, ProblemTemplate>(&format!(
        "UPDATE problem_templates SET
            name = COALESCE($1, name),
            problem_text = COALESCE($2, problem_text),
            variables = COALESCE($3, variables),
            solution_formula = COALESCE($4, solution_formula),
            answer_count = COALESCE($5, answer_count),
            answer_units = COALESCE($6, answer_units),
            difficulty = COALESCE($7, difficulty),
            image_filename = COALESCE($8, image_filename),
            updated_at = $9
         WHERE id = $10
         RETURNING {COLUMNS}",
    ))
    .bind(params.name)
    .bind(params.problem_text)
    .bind(params.variables)
    .bind(params.solution_formula)
    .bind(params.answer_count)
    .bind(params.answer_units)
    .bind(params.difficulty)
    .bind(params.image_filename)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Deletes the template together with its recorded responses.
pub(crate) async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_responses WHERE template_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result =
        sqlx::query("DELETE FROM problem_templates WHERE id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
