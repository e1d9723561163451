use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::db::types::ErrorType;

pub(crate) struct CreateResponse<'a> {
    pub user_id: &'a str,
    pub template_id: i64,
    pub problem_text: &'a str,
    pub user_answer: Option<f64>,
    pub raw_answer: Option<&'a str>,
    pub correct_answer: f64,
    pub is_correct: bool,
    pub error_type: ErrorType,
    pub attempt_number: i32,
    pub time_taken: f64,
    pub answer_index: i32,
    pub created_at: PrimitiveDateTime,
}

/// Inserts every answer of one attempt or none of them.
pub(crate) async fn insert_attempt(
    pool: &PgPool,
    rows: &[CreateResponse<'_>],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT INTO user_responses (
                user_id, template_id, problem_text, user_answer, raw_answer,
                correct_answer, is_correct, error_type, attempt_number,
                time_taken, answer_index, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(row.user_id)
        .bind(row.template_id)
        .bind(row.problem_text)
        .bind(row.user_answer)
        .bind(row.raw_answer)
        .bind(row.correct_answer)
        .bind(row.is_correct)
        .bind(row.error_type)
        .bind(row.attempt_number)
        .bind(row.time_taken)
        .bind(row.answer_index)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub(crate) async fn max_attempt(
    pool: &PgPool,
    user_id: &str,
    template_id: i64,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(MAX(attempt_number), 0) FROM user_responses
         WHERE user_id = $1 AND template_id = $2",
    )
    .bind(user_id)
    .bind(template_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn has_fully_correct_attempt(
    pool: &PgPool,
    user_id: &str,
    template_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM user_responses
            WHERE user_id = $1 AND template_id = $2
            GROUP BY attempt_number
            HAVING BOOL_AND(is_correct)
        )",
    )
    .bind(user_id)
    .bind(template_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn completed_template_ids(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT template_id FROM (
            SELECT template_id, attempt_number FROM user_responses
            WHERE user_id = $1
            GROUP BY template_id, attempt_number
            HAVING BOOL_AND(is_correct)
        ) AS completed
        ORDER BY template_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
struct ScoreRow {
    completed_count: i64,
    total_score: i64,
    total_time: f64,
}

/// Recomputes the user's summary from fully-correct attempts. Returns
/// whether every template is now completed.
pub(crate) async fn refresh_completion(
    pool: &PgPool,
    user_id: &str,
    template_count: i64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_as::<_, ScoreRow>(
        "WITH full_attempts AS (
            SELECT template_id, attempt_number FROM user_responses
            WHERE user_id = $1
            GROUP BY template_id, attempt_number
            HAVING BOOL_AND(is_correct)
        )
        SELECT
            (SELECT COUNT(DISTINCT template_id) FROM full_attempts) AS completed_count,
            COUNT(r.id) AS total_score,
            COALESCE(SUM(r.time_taken), 0)::float8 AS total_time
        FROM user_responses r
        JOIN full_attempts f
          ON f.template_id = r.template_id AND f.attempt_number = r.attempt_number
        WHERE r.user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let completed_all = template_count > 0 && row.completed_count >= template_count;

    sqlx::query(
        "UPDATE users SET
            completed_all = $1,
            completed_at = CASE WHEN $1 THEN $2 ELSE completed_at END,
            total_score = $3,
            total_time = $4,
            updated_at = $2
         WHERE id = $5",
    )
    .bind(completed_all)
    .bind(now)
    .bind(row.total_score)
    .bind(row.total_time)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(completed_all)
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TemplateStats {
    pub(crate) template_id: i64,
    pub(crate) name: String,
    pub(crate) total_attempts: i64,
    pub(crate) correct_attempts: i64,
    pub(crate) completed_students: i64,
    pub(crate) participant_students: i64,
    pub(crate) avg_time: Option<f64>,
    pub(crate) avg_correct_time: Option<f64>,
    pub(crate) top_error_type: Option<ErrorType>,
}

impl TemplateStats {
    /// Share of attempts that were fully correct, in percent with one decimal.
    pub(crate) fn correct_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        let rate = self.correct_attempts as f64 / self.total_attempts as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

/// Attempt-level statistics for one template, students only.
pub(crate) async fn template_stats(
    pool: &PgPool,
    template_id: i64,
) -> Result<Option<TemplateStats>, sqlx::Error> {
    sqlx::query_as::<_, TemplateStats>(
        "WITH attempts AS (
            SELECT r.user_id, r.attempt_number,
                   BOOL_AND(r.is_correct) AS all_correct,
                   MAX(r.time_taken) AS time_taken
            FROM user_responses r
            JOIN users u ON u.id = r.user_id
            WHERE r.template_id = $1 AND u.is_admin = FALSE
            GROUP BY r.user_id, r.attempt_number
        )
        SELECT
            t.id AS template_id,
            t.name,
            (SELECT COUNT(*) FROM attempts) AS total_attempts,
            (SELECT COUNT(*) FROM attempts WHERE all_correct) AS correct_attempts,
            (SELECT COUNT(DISTINCT user_id) FROM attempts WHERE all_correct)
                AS completed_students,
            (SELECT COUNT(DISTINCT user_id) FROM attempts) AS participant_students,
            (SELECT AVG(time_taken) FROM attempts) AS avg_time,
            (SELECT AVG(time_taken) FROM attempts WHERE all_correct) AS avg_correct_time,
            (
                SELECT r.error_type FROM user_responses r
                JOIN users u ON u.id = r.user_id
                WHERE r.template_id = t.id AND u.is_admin = FALSE AND r.is_correct = FALSE
                GROUP BY r.error_type
                ORDER BY COUNT(*) DESC
                LIMIT 1
            ) AS top_error_type
        FROM problem_templates t
        WHERE t.id = $1",
    )
    .bind(template_id)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct CompletionSummary {
    pub(crate) total_students: i64,
    pub(crate) completed_count: i64,
    pub(crate) avg_score: Option<f64>,
    pub(crate) avg_time: Option<f64>,
    pub(crate) today_completions: i64,
}

impl CompletionSummary {
    pub(crate) fn completion_rate(&self) -> f64 {
        if self.total_students == 0 {
            return 0.0;
        }
        let rate = self.completed_count as f64 / self.total_students as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TopStudent {
    pub(crate) username: String,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn completion_summary(
    pool: &PgPool,
    day_start: PrimitiveDateTime,
) -> Result<CompletionSummary, sqlx::Error> {
    sqlx::query_as::<_, CompletionSummary>(
        "SELECT
            COUNT(*) AS total_students,
            COUNT(*) FILTER (WHERE completed_all) AS completed_count,
            AVG(total_score)::float8 AS avg_score,
            AVG(total_time) AS avg_time,
            COUNT(*) FILTER (WHERE completed_all AND completed_at >= $1) AS today_completions
         FROM users
         WHERE is_admin = FALSE",
    )
    .bind(day_start)
    .fetch_one(pool)
    .await
}

pub(crate) async fn top_students(pool: &PgPool, limit: i64) -> Result<Vec<TopStudent>, sqlx::Error> {
    sqlx::query_as::<_, TopStudent>(
        "SELECT username, total_score, total_time, completed_at
         FROM users
         WHERE completed_all = TRUE AND is_admin = FALSE
         ORDER BY total_score DESC, total_time ASC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct HistoryRow {
    pub(crate) id: i64,
    pub(crate) template_id: i64,
    pub(crate) template_name: String,
    pub(crate) problem_text: String,
    pub(crate) user_answer: Option<f64>,
    pub(crate) raw_answer: Option<String>,
    pub(crate) correct_answer: f64,
    pub(crate) is_correct: bool,
    pub(crate) error_type: ErrorType,
    pub(crate) attempt_number: i32,
    pub(crate) answer_index: i32,
    pub(crate) time_taken: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Recorded answers of one user, newest first.
pub(crate) async fn history(
    pool: &PgPool,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, HistoryRow>(
        "SELECT
            r.id, r.template_id, t.name AS template_name, r.problem_text,
            r.user_answer, r.raw_answer, r.correct_answer, r.is_correct,
            r.error_type, r.attempt_number, r.answer_index, r.time_taken, r.created_at
         FROM user_responses r
         JOIN problem_templates t ON t.id = r.template_id
         WHERE r.user_id = $1
         ORDER BY r.created_at DESC, r.id DESC
         OFFSET $2 LIMIT $3",
    )
    .bind(user_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct HistorySummary {
    pub(crate) total_answers: i64,
    pub(crate) correct_answers: i64,
    pub(crate) avg_time: Option<f64>,
}

impl HistorySummary {
    pub(crate) fn accuracy(&self) -> f64 {
        if self.total_answers == 0 {
            return 0.0;
        }
        let rate = self.correct_answers as f64 / self.total_answers as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

pub(crate) async fn history_summary(
    pool: &PgPool,
    user_id: &str,
) -> Result<HistorySummary, sqlx::Error> {
    sqlx::query_as::<_, HistorySummary>(
        "SELECT
            COUNT(*) AS total_answers,
            COUNT(*) FILTER (WHERE is_correct) AS correct_answers,
            AVG(time_taken) AS avg_time
         FROM user_responses
         WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentRow {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) completed_all: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) total_count: i64,
}

/// Non-admin users, optionally filtered by completion. Finishers come first,
/// most recent completion on top.
pub(crate) async fn students(
    pool: &PgPool,
    completed: Option<bool>,
    skip: i64,
    limit: i64,
) -> Result<Vec<StudentRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentRow>(
        "SELECT
            id, username, full_name, completed_all, completed_at,
            total_score, total_time, created_at,
            COUNT(*) OVER () AS total_count
         FROM users
         WHERE is_admin = FALSE AND ($1::boolean IS NULL OR completed_all = $1)
         ORDER BY completed_at DESC NULLS LAST, total_score DESC, username
         OFFSET $2 LIMIT $3",
    )
    .bind(completed)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentProblemStats {
    pub(crate) template_id: i64,
    pub(crate) name: String,
    pub(crate) total_attempts: i64,
    pub(crate) correct_attempts: i64,
    pub(crate) best_time: Option<f64>,
    pub(crate) avg_time: Option<f64>,
    pub(crate) last_attempt_at: Option<PrimitiveDateTime>,
}

/// One row per template, attempted or not, for a single user.
pub(crate) async fn student_problem_stats(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<StudentProblemStats>, sqlx::Error> {
    sqlx::query_as::<_, StudentProblemStats>(
        "WITH attempts AS (
            SELECT template_id, attempt_number,
                   BOOL_AND(is_correct) AS all_correct,
                   MAX(time_taken) AS time_taken,
                   MAX(created_at) AS answered_at
            FROM user_responses
            WHERE user_id = $1
            GROUP BY template_id, attempt_number
        )
        SELECT
            t.id AS template_id,
            t.name,
            COUNT(a.attempt_number) AS total_attempts,
            COUNT(a.attempt_number) FILTER (WHERE a.all_correct) AS correct_attempts,
            MIN(a.time_taken) FILTER (WHERE a.all_correct) AS best_time,
            AVG(a.time_taken) AS avg_time,
            MAX(a.answered_at) AS last_attempt_at
        FROM problem_templates t
        LEFT JOIN attempts a ON a.template_id = t.id
        GROUP BY t.id, t.name
        ORDER BY t.id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_accuracy_rounds_to_one_decimal() {
        let mut summary = HistorySummary { total_answers: 0, correct_answers: 0, avg_time: None };
        assert_eq!(summary.accuracy(), 0.0);

        summary.total_answers = 6;
        summary.correct_answers = 5;
        assert_eq!(summary.accuracy(), 83.3);
    }

    fn stats(total_attempts: i64, correct_attempts: i64) -> TemplateStats {
        TemplateStats {
            template_id: 1,
            name: "Rod in field".to_string(),
            total_attempts,
            correct_attempts,
            completed_students: 0,
            participant_students: 0,
            avg_time: None,
            avg_correct_time: None,
            top_error_type: None,
        }
    }

    #[test]
    fn correct_rate_rounds_to_one_decimal() {
        assert_eq!(stats(0, 0).correct_rate(), 0.0);
        assert_eq!(stats(3, 1).correct_rate(), 33.3);
        assert_eq!(stats(4, 4).correct_rate(), 100.0);
    }

    #[test]
    fn completion_rate_handles_empty_population() {
        let mut summary = CompletionSummary {
            total_students: 0,
            completed_count: 0,
            avg_score: None,
            avg_time: None,
            today_completions: 0,
        };
        assert_eq!(summary.completion_rate(), 0.0);

        summary.total_students = 3;
        summary.completed_count = 2;
        assert_eq!(summary.completion_rate(), 66.7);
    }
}
