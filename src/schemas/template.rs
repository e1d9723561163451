use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::ProblemTemplate;
use crate::db::types::{DifficultyLevel, ErrorType};
use crate::repositories::responses::{CompletionSummary, TemplateStats, TopStudent};
use crate::services::problem_generator::ProblemInstance;
use crate::services::problem_pool::PoolStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TemplateCreate {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub(crate) name: String,
    #[serde(alias = "problemText")]
    #[validate(length(min = 1, message = "problem_text must not be empty"))]
    pub(crate) problem_text: String,
    #[validate(length(min = 1, message = "variables must not be empty"))]
    pub(crate) variables: String,
    #[serde(alias = "solutionFormula")]
    #[validate(length(min = 1, message = "solution_formula must not be empty"))]
    pub(crate) solution_formula: String,
    #[serde(default = "default_answer_count")]
    #[serde(alias = "answerCount")]
    #[validate(range(min = 1, max = 10, message = "answer_count must be between 1 and 10"))]
    pub(crate) answer_count: i32,
    #[serde(default)]
    #[serde(alias = "answerUnits")]
    pub(crate) answer_units: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default)]
    #[serde(alias = "imageFilename")]
    pub(crate) image_filename: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TemplateUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub(crate) name: Option<String>,
    #[serde(default)]
    #[serde(alias = "problemText")]
    #[validate(length(min = 1, message = "problem_text must not be empty"))]
    pub(crate) problem_text: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "variables must not be empty"))]
    pub(crate) variables: Option<String>,
    #[serde(default)]
    #[serde(alias = "solutionFormula")]
    #[validate(length(min = 1, message = "solution_formula must not be empty"))]
    pub(crate) solution_formula: Option<String>,
    #[serde(default)]
    #[serde(alias = "answerCount")]
    #[validate(range(min = 1, max = 10, message = "answer_count must be between 1 and 10"))]
    pub(crate) answer_count: Option<i32>,
    #[serde(default)]
    #[serde(alias = "answerUnits")]
    pub(crate) answer_units: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    #[serde(alias = "imageFilename")]
    pub(crate) image_filename: Option<String>,
}

fn default_answer_count() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateResponse {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) problem_text: String,
    pub(crate) variables: String,
    pub(crate) solution_formula: String,
    pub(crate) answer_count: i32,
    pub(crate) answer_units: Option<String>,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) image_filename: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TemplateResponse {
    pub(crate) fn from_db(template: &ProblemTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            problem_text: template.problem_text.clone(),
            variables: template.variables.clone(),
            solution_formula: template.solution_formula.clone(),
            answer_count: template.answer_count,
            answer_units: template.answer_units.clone(),
            difficulty: template.difficulty,
            image_filename: template.image_filename.clone(),
            created_at: format_primitive(template.created_at),
            updated_at: format_primitive(template.updated_at),
        }
    }
}

/// Admin preview: the full instance, answers included.
#[derive(Debug, Serialize)]
pub(crate) struct PreviewResponse {
    pub(crate) template_id: i64,
    pub(crate) problem_text: String,
    pub(crate) variables: BTreeMap<String, f64>,
    pub(crate) correct_answers: Vec<f64>,
    pub(crate) answer_units: Vec<String>,
}

impl From<ProblemInstance> for PreviewResponse {
    fn from(instance: ProblemInstance) -> Self {
        Self {
            template_id: instance.template_id,
            problem_text: instance.problem_text,
            variables: instance.variables,
            correct_answers: instance.correct_answers,
            answer_units: instance.answer_units,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateStatsResponse {
    pub(crate) template_id: i64,
    pub(crate) name: String,
    pub(crate) total_attempts: i64,
    pub(crate) correct_attempts: i64,
    pub(crate) correct_rate: f64,
    pub(crate) completed_students: i64,
    pub(crate) participant_students: i64,
    pub(crate) avg_time: f64,
    pub(crate) avg_correct_time: f64,
    pub(crate) top_error_type: Option<ErrorType>,
}

impl From<TemplateStats> for TemplateStatsResponse {
    fn from(stats: TemplateStats) -> Self {
        Self {
            correct_rate: stats.correct_rate(),
            template_id: stats.template_id,
            name: stats.name,
            total_attempts: stats.total_attempts,
            correct_attempts: stats.correct_attempts,
            completed_students: stats.completed_students,
            participant_students: stats.participant_students,
            avg_time: round1(stats.avg_time.unwrap_or(0.0)),
            avg_correct_time: round1(stats.avg_correct_time.unwrap_or(0.0)),
            top_error_type: stats.top_error_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheInvalidateResponse {
    pub(crate) cleared: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct PoolsResponse {
    pub(crate) backend: &'static str,
    pub(crate) target_size: u64,
    pub(crate) low_water: u64,
    pub(crate) cached_templates: usize,
    pub(crate) pools: Vec<PoolStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TopStudentResponse {
    pub(crate) username: String,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) completed_at: Option<String>,
}

impl From<TopStudent> for TopStudentResponse {
    fn from(student: TopStudent) -> Self {
        Self {
            username: student.username,
            total_score: student.total_score,
            total_time: round1(student.total_time),
            completed_at: student.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionResponse {
    pub(crate) total_students: i64,
    pub(crate) completed_count: i64,
    pub(crate) completion_rate: f64,
    pub(crate) avg_score: f64,
    pub(crate) avg_time: f64,
    pub(crate) today_completions: i64,
    pub(crate) top_students: Vec<TopStudentResponse>,
}

impl CompletionResponse {
    pub(crate) fn new(summary: CompletionSummary, top_students: Vec<TopStudent>) -> Self {
        Self {
            completion_rate: summary.completion_rate(),
            total_students: summary.total_students,
            completed_count: summary.completed_count,
            avg_score: round1(summary.avg_score.unwrap_or(0.0)),
            avg_time: round1(summary.avg_time.unwrap_or(0.0)),
            today_completions: summary.today_completions,
            top_students: top_students.into_iter().map(TopStudentResponse::from).collect(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
