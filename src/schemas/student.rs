use serde::{Deserialize, Serialize};

use crate::api::pagination::{default_limit, PageQuery};
use crate::core::time::format_primitive;
use crate::db::models::User;
use crate::repositories::responses::{StudentProblemStats, StudentRow};

#[derive(Debug, Deserialize)]
pub(crate) struct StudentsQuery {
    #[serde(default)]
    pub(crate) completed: Option<bool>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

impl StudentsQuery {
    pub(crate) fn page(&self) -> PageQuery {
        PageQuery::new(self.skip, self.limit)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentSummaryResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) completed_all: bool,
    pub(crate) completed_at: Option<String>,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) created_at: String,
}

impl From<StudentRow> for StudentSummaryResponse {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            completed_all: row.completed_all,
            completed_at: row.completed_at.map(format_primitive),
            total_score: row.total_score,
            total_time: row.total_time,
            created_at: format_primitive(row.created_at),
        }
    }
}

impl From<User> for StudentSummaryResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            completed_all: user.completed_all,
            completed_at: user.completed_at.map(format_primitive),
            total_score: user.total_score,
            total_time: user.total_time,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentProblemResponse {
    pub(crate) template_id: i64,
    pub(crate) display_number: usize,
    pub(crate) name: String,
    pub(crate) total_attempts: i64,
    pub(crate) correct_attempts: i64,
    pub(crate) completed: bool,
    pub(crate) best_time: Option<f64>,
    pub(crate) avg_time: Option<f64>,
    pub(crate) last_attempt_at: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct StudentOverall {
    pub(crate) attempted_problems: usize,
    pub(crate) completed_problems: usize,
    pub(crate) total_attempts: i64,
    pub(crate) correct_attempts: i64,
    pub(crate) avg_time: f64,
}

impl StudentOverall {
    /// Attempt-weighted over every template.
    pub(crate) fn from_problems(problems: &[StudentProblemStats]) -> Self {
        let total_attempts: i64 = problems.iter().map(|p| p.total_attempts).sum();
        let time_sum: f64 = problems
            .iter()
            .filter_map(|p| p.avg_time.map(|avg| avg * p.total_attempts as f64))
            .sum();
        let avg_time = if total_attempts == 0 { 0.0 } else { time_sum / total_attempts as f64 };

        Self {
            attempted_problems: problems.iter().filter(|p| p.total_attempts > 0).count(),
            completed_problems: problems.iter().filter(|p| p.correct_attempts > 0).count(),
            total_attempts,
            correct_attempts: problems.iter().map(|p| p.correct_attempts).sum(),
            avg_time: (avg_time * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentDetailResponse {
    pub(crate) student: StudentSummaryResponse,
    pub(crate) total_problems: usize,
    pub(crate) overall: StudentOverall,
    pub(crate) problems: Vec<StudentProblemResponse>,
}

impl StudentDetailResponse {
    pub(crate) fn new(user: User, problems: Vec<StudentProblemStats>) -> Self {
        let overall = StudentOverall::from_problems(&problems);
        let problems: Vec<StudentProblemResponse> = problems
            .into_iter()
            .enumerate()
            .map(|(index, stats)| StudentProblemResponse {
                template_id: stats.template_id,
                display_number: index + 1,
                name: stats.name,
                total_attempts: stats.total_attempts,
                correct_attempts: stats.correct_attempts,
                completed: stats.correct_attempts > 0,
                best_time: stats.best_time,
                avg_time: stats.avg_time,
                last_attempt_at: stats.last_attempt_at.map(format_primitive),
            })
            .collect();

        Self { student: user.into(), total_problems: problems.len(), overall, problems }
    }
}
