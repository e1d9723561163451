use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::grading::{self, AnswerGrade};
use crate::services::problem_generator::ProblemInstance;
use crate::services::problem_pool::{IssuedProblem, PoolError, ProblemPool};

const MAX_PROBLEM_TEXT_CHARS: usize = 1000;
const MAX_TIME_TAKEN_SECONDS: f64 = 86_400.0;
const CLAMPED_TIME_TAKEN_SECONDS: f64 = 3_600.0;

#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    #[error("template {0} not found")]
    TemplateNotFound(i64),
    #[error("token belongs to template {actual}, not {expected}")]
    TemplateMismatch { expected: i64, actual: i64 },
    #[error("template {0} already completed")]
    AlreadyCompleted(i64),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for recorded answers and the per-user summary.
#[async_trait]
pub(crate) trait ResponseLedger: Send + Sync {
    async fn has_completed(&self, user_id: &str, template_id: i64) -> Result<bool, sqlx::Error>;

    async fn last_attempt(&self, user_id: &str, template_id: i64) -> Result<i32, sqlx::Error>;

    async fn record(&self, attempt: &AttemptRecord<'_>) -> Result<(), sqlx::Error>;

    /// Returns whether the user has now completed every template.
    async fn refresh_completion(&self, user_id: &str) -> Result<bool, sqlx::Error>;
}

pub(crate) struct AttemptRecord<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) instance: &'a ProblemInstance,
    pub(crate) attempt_number: i32,
    pub(crate) time_taken: f64,
    pub(crate) grades: &'a [AnswerGrade],
}

pub(crate) struct PgResponseLedger {
    pool: PgPool,
}

impl PgResponseLedger {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseLedger for PgResponseLedger {
    async fn has_completed(&self, user_id: &str, template_id: i64) -> Result<bool, sqlx::Error> {
        repositories::responses::has_fully_correct_attempt(&self.pool, user_id, template_id).await
    }

    async fn last_attempt(&self, user_id: &str, template_id: i64) -> Result<i32, sqlx::Error> {
        repositories::responses::max_attempt(&self.pool, user_id, template_id).await
    }

    async fn record(&self, attempt: &AttemptRecord<'_>) -> Result<(), sqlx::Error> {
        let problem_text = truncate_problem_text(&attempt.instance.problem_text);
        let now = primitive_now_utc();
        let rows: Vec<_> = attempt
            .grades
            .iter()
            .map(|grade| repositories::responses::CreateResponse {
                user_id: attempt.user_id,
                template_id: attempt.instance.template_id,
                problem_text: &problem_text,
                user_answer: grade.answer.value(),
                raw_answer: grade.answer.raw(),
                correct_answer: grade.correct_answer,
                is_correct: grade.is_correct,
                error_type: grade.error_type,
                attempt_number: attempt.attempt_number,
                time_taken: attempt.time_taken,
                answer_index: grade.index as i32,
                created_at: now,
            })
            .collect();
        repositories::responses::insert_attempt(&self.pool, &rows).await
    }

    async fn refresh_completion(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let template_count = repositories::templates::count(&self.pool).await?;
        repositories::responses::refresh_completion(
            &self.pool,
            user_id,
            template_count,
            primitive_now_utc(),
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Submission {
    pub(crate) token: String,
    pub(crate) answers: Vec<Value>,
    pub(crate) time_taken: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct GradedSubmission {
    pub(crate) correct: bool,
    pub(crate) attempt_number: i32,
    pub(crate) grades: Vec<AnswerGrade>,
    pub(crate) correct_answers: Vec<f64>,
    pub(crate) answer_count: usize,
    pub(crate) save_success: bool,
    pub(crate) completed_all: bool,
    /// Replacement problem after a wrong answer.
    pub(crate) next_problem: Option<IssuedProblem>,
}

#[derive(Debug, Clone)]
pub(crate) enum SubmissionOutcome {
    /// The token had expired; a fresh problem was issued instead of grading.
    Expired(IssuedProblem),
    Graded(GradedSubmission),
}

pub(crate) fn clamp_time_taken(seconds: f64) -> f64 {
    if !seconds.is_finite() || seconds < 0.0 {
        0.0
    } else if seconds > MAX_TIME_TAKEN_SECONDS {
        CLAMPED_TIME_TAKEN_SECONDS
    } else {
        seconds
    }
}

pub(crate) fn truncate_problem_text(text: &str) -> String {
    if text.chars().count() <= MAX_PROBLEM_TEXT_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_PROBLEM_TEXT_CHARS).collect();
    truncated.push_str("...");
    truncated
}

async fn issue_fresh(pool: &ProblemPool, template_id: i64) -> Result<IssuedProblem, SubmissionError> {
    pool.fetch(template_id).await?.ok_or(SubmissionError::TemplateNotFound(template_id))
}

pub(crate) async fn submit(
    pool: &ProblemPool,
    ledger: &dyn ResponseLedger,
    user_id: &str,
    template_id: i64,
    submission: Submission,
) -> Result<SubmissionOutcome, SubmissionError> {
    let Some(instance) = pool.tokens().read(&submission.token).await.map_err(PoolError::from)?
    else {
        tracing::info!(user_id, template_id, "Submission with expired token");
        return Ok(SubmissionOutcome::Expired(issue_fresh(pool, template_id).await?));
    };

    if instance.template_id != template_id {
        return Err(SubmissionError::TemplateMismatch {
            expected: template_id,
            actual: instance.template_id,
        });
    }

    if ledger.has_completed(user_id, template_id).await? {
        return Err(SubmissionError::AlreadyCompleted(template_id));
    }

    let time_taken = clamp_time_taken(submission.time_taken);
    let grades = grading::grade_submission(&submission.answers, &instance.correct_answers);
    let correct = !grades.is_empty() && grades.iter().all(|grade| grade.is_correct);
    let attempt_number = ledger.last_attempt(user_id, template_id).await? + 1;

    let record = AttemptRecord {
        user_id,
        instance: &instance,
        attempt_number,
        time_taken,
        grades: &grades,
    };
    let save_success = match ledger.record(&record).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(user_id, template_id, error = %err, "Failed to save responses");
            false
        }
    };

    metrics::counter!(
        "submissions_total",
        "template_id" => template_id.to_string(),
        "correct" => correct.to_string()
    )
    .increment(1);

    let mut completed_all = false;
    let mut next_problem = None;
    if correct {
        completed_all = match ledger.refresh_completion(user_id).await {
            Ok(completed_all) => completed_all,
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to refresh completion summary");
                false
            }
        };
    } else {
        pool.tokens().revoke(&submission.token).await.map_err(PoolError::from)?;
        next_problem = Some(issue_fresh(pool, template_id).await?);
    }

    tracing::info!(user_id, template_id, attempt_number, correct, save_success, "Submission graded");

    Ok(SubmissionOutcome::Graded(GradedSubmission {
        correct,
        attempt_number,
        grades,
        correct_answers: instance.correct_answers,
        answer_count: instance.answer_count,
        save_success,
        completed_all,
        next_problem,
    }))
}
