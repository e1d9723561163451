use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::pagination::PaginatedResponse;
use crate::core::time::format_primitive;
use crate::db::types::{DifficultyLevel, ErrorType};
use crate::repositories::responses::{HistoryRow, HistorySummary};
use crate::services::grading::AnswerGrade;
use crate::services::problem_pool::IssuedProblem;
use crate::services::submission::GradedSubmission;

#[derive(Debug, Serialize)]
pub(crate) struct ProblemListItem {
    pub(crate) template_id: i64,
    /// 1-based position in the listing.
    pub(crate) display_number: usize,
    pub(crate) name: String,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) answer_count: i32,
    pub(crate) completed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProblemListResponse {
    pub(crate) problems: Vec<ProblemListItem>,
    pub(crate) completed_count: usize,
    pub(crate) total: usize,
}

/// A problem as shown to a student; never carries the answers.
#[derive(Debug, Serialize)]
pub(crate) struct ProblemView {
    pub(crate) token: String,
    pub(crate) template_id: i64,
    pub(crate) template_name: String,
    pub(crate) problem_text: String,
    pub(crate) answer_count: usize,
    pub(crate) answer_units: Vec<String>,
    pub(crate) image_filename: Option<String>,
    pub(crate) expires_in: u64,
}

impl ProblemView {
    pub(crate) fn from_issued(issued: IssuedProblem, expires_in: u64) -> Self {
        let instance = issued.instance;
        Self {
            token: issued.token,
            template_id: instance.template_id,
            template_name: instance.template_name,
            problem_text: instance.problem_text,
            answer_count: instance.answer_count,
            answer_units: instance.answer_units,
            image_filename: instance.image_filename,
            expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProblemQuery {
    #[serde(default)]
    pub(crate) token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub(crate) token: String,
    #[serde(default)]
    pub(crate) answers: Vec<Value>,
    #[serde(default)]
    #[serde(alias = "timeTaken")]
    pub(crate) time_taken: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResult {
    pub(crate) index: usize,
    pub(crate) user_answer: Option<f64>,
    pub(crate) is_correct: bool,
    pub(crate) error_type: ErrorType,
}

impl From<&AnswerGrade> for AnswerResult {
    fn from(grade: &AnswerGrade) -> Self {
        Self {
            index: grade.index,
            user_answer: grade.answer.value(),
            is_correct: grade.is_correct,
            error_type: grade.error_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    /// `graded` or `expired`.
    pub(crate) status: &'static str,
    pub(crate) correct: bool,
    pub(crate) message: String,
    pub(crate) answer_count: usize,
    pub(crate) user_answers: Vec<Option<f64>>,
    pub(crate) results: Vec<AnswerResult>,
    pub(crate) correct_answers: Option<Vec<f64>>,
    pub(crate) total_attempts: i32,
    pub(crate) save_success: bool,
    pub(crate) completed_all: bool,
    pub(crate) new_problem: Option<ProblemView>,
}

impl SubmitResponse {
    pub(crate) fn graded(graded: GradedSubmission, expires_in: u64) -> Self {
        let message = if graded.completed_all {
            "Correct! Every problem is now solved."
        } else if graded.correct {
            "Correct!"
        } else {
            "Incorrect. Here is a new variant of the problem."
        };

        Self {
            status: "graded",
            correct: graded.correct,
            message: message.to_string(),
            answer_count: graded.answer_count,
            user_answers: graded.grades.iter().map(|grade| grade.answer.value()).collect(),
            results: graded.grades.iter().map(AnswerResult::from).collect(),
            correct_answers: Some(graded.correct_answers),
            total_attempts: graded.attempt_number,
            save_success: graded.save_success,
            completed_all: graded.completed_all,
            new_problem: graded
                .next_problem
                .map(|issued| ProblemView::from_issued(issued, expires_in)),
        }
    }

    /// The token had expired; nothing was graded and a fresh problem is attached.
    pub(crate) fn expired(issued: IssuedProblem, expires_in: u64) -> Self {
        Self {
            status: "expired",
            correct: false,
            message: "The problem expired. Here is a new one.".to_string(),
            answer_count: issued.instance.answer_count,
            user_answers: Vec::new(),
            results: Vec::new(),
            correct_answers: None,
            total_attempts: 0,
            save_success: false,
            completed_all: false,
            new_problem: Some(ProblemView::from_issued(issued, expires_in)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryEntryResponse {
    pub(crate) id: i64,
    pub(crate) template_id: i64,
    pub(crate) template_name: String,
    pub(crate) problem_text: String,
    pub(crate) answer_index: i32,
    pub(crate) user_answer: Option<f64>,
    pub(crate) raw_answer: Option<String>,
    pub(crate) correct_answer: f64,
    pub(crate) is_correct: bool,
    pub(crate) error_type: ErrorType,
    pub(crate) attempt_number: i32,
    pub(crate) time_taken: f64,
    pub(crate) answered_at: String,
}

impl From<HistoryRow> for HistoryEntryResponse {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            template_id: row.template_id,
            template_name: row.template_name,
            problem_text: row.problem_text,
            answer_index: row.answer_index,
            user_answer: row.user_answer,
            raw_answer: row.raw_answer,
            correct_answer: row.correct_answer,
            is_correct: row.is_correct,
            error_type: row.error_type,
            attempt_number: row.attempt_number,
            time_taken: row.time_taken,
            answered_at: format_primitive(row.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryStats {
    pub(crate) total_answers: i64,
    pub(crate) correct_answers: i64,
    pub(crate) accuracy: f64,
    pub(crate) avg_time: f64,
}

impl From<&HistorySummary> for HistoryStats {
    fn from(summary: &HistorySummary) -> Self {
        Self {
            total_answers: summary.total_answers,
            correct_answers: summary.correct_answers,
            accuracy: summary.accuracy(),
            avg_time: (summary.avg_time.unwrap_or(0.0) * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HistoryResponse {
    pub(crate) stats: HistoryStats,
    #[serde(flatten)]
    pub(crate) page: PaginatedResponse<HistoryEntryResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grading::grade_submission;
    use crate::test_support::sample_instance;

    #[test]
    fn wrong_submission_carries_new_problem_without_answers() {
        let instance = sample_instance(1);
        let grades = grade_submission(&[serde_json::json!(99.0)], &instance.correct_answers);
        let next = IssuedProblem { token: "next".to_string(), instance: sample_instance(1) };

        let response = SubmitResponse::graded(
            GradedSubmission {
                correct: false,
                attempt_number: 2,
                grades,
                correct_answers: instance.correct_answers.clone(),
                answer_count: 1,
                save_success: true,
                completed_all: false,
                next_problem: Some(next),
            },
            900,
        );

        assert_eq!(response.status, "graded");
        assert_eq!(response.user_answers, vec![Some(99.0)]);
        assert_eq!(response.correct_answers, Some(vec![1.5]));
        assert_eq!(response.total_attempts, 2);

        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["new_problem"]["token"], "next");
        assert_eq!(json["new_problem"]["expires_in"], 900);
        assert!(json["new_problem"].get("correct_answers").is_none());
        assert!(json["new_problem"].get("variables").is_none());
    }

    #[test]
    fn expired_response_has_no_grades() {
        let issued = IssuedProblem { token: "fresh".to_string(), instance: sample_instance(3) };
        let response = SubmitResponse::expired(issued, 900);

        assert_eq!(response.status, "expired");
        assert!(response.results.is_empty());
        assert!(response.correct_answers.is_none());
        assert_eq!(response.new_problem.as_ref().map(|view| view.template_id), Some(3));
    }
}
