use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{PageQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::problem::{
    HistoryEntryResponse, HistoryResponse, HistoryStats, ProblemListItem, ProblemListResponse,
    ProblemQuery, ProblemView, SubmitRequest, SubmitResponse,
};
use crate::services::problem_pool::IssuedProblem;
use crate::services::submission::{self, Submission, SubmissionOutcome};

pub(super) async fn list_problems(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProblemListResponse>, ApiError> {
    let templates = repositories::templates::list(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list problem templates"))?;
    let completed: HashSet<i64> =
        repositories::responses::completed_template_ids(state.db(), &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load completed problems"))?
            .into_iter()
            .collect();

    let problems: Vec<ProblemListItem> = templates
        .iter()
        .enumerate()
        .map(|(index, template)| ProblemListItem {
            template_id: template.id,
            display_number: index + 1,
            name: template.name.clone(),
            difficulty: template.difficulty,
            answer_count: template.answer_count,
            completed: completed.contains(&template.id),
        })
        .collect();
    let completed_count = problems.iter().filter(|problem| problem.completed).count();

    Ok(Json(ProblemListResponse { total: problems.len(), completed_count, problems }))
}

pub(super) async fn history(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let page = query.clamped();

    let summary = repositories::responses::history_summary(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load answer statistics"))?;
    let rows = repositories::responses::history(state.db(), &user.id, page.skip, page.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load answer history"))?;

    let items = rows.into_iter().map(HistoryEntryResponse::from).collect();
    Ok(Json(HistoryResponse {
        stats: HistoryStats::from(&summary),
        page: PaginatedResponse::new(items, summary.total_answers, page),
    }))
}

pub(super) async fn get_problem(
    Path(template_id): Path<i64>,
    Query(query): Query<ProblemQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProblemView>, ApiError> {
    let issued = state
        .pool()
        .resume_or_fetch(template_id, query.token.as_deref())
        .await?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    tracing::debug!(user_id = %user.id, template_id, "Problem served");
    Ok(Json(view(&state, issued)))
}

pub(super) async fn refresh_problem(
    Path(template_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ProblemView>, ApiError> {
    let issued = state
        .pool()
        .fetch(template_id)
        .await?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    tracing::debug!(user_id = %user.id, template_id, "Problem refreshed");
    Ok(Json(view(&state, issued)))
}

pub(super) async fn submit_answers(
    Path(template_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    if payload.token.trim().is_empty() {
        return Err(ApiError::BadRequest("token is required".to_string()));
    }

    let outcome = submission::submit(
        state.pool(),
        state.ledger(),
        &user.id,
        template_id,
        Submission {
            token: payload.token,
            answers: payload.answers,
            time_taken: payload.time_taken,
        },
    )
    .await?;

    let expires_in = state.pool().tokens().ttl().as_secs();
    let response = match outcome {
        SubmissionOutcome::Expired(issued) => SubmitResponse::expired(issued, expires_in),
        SubmissionOutcome::Graded(graded) => SubmitResponse::graded(graded, expires_in),
    };
    Ok(Json(response))
}

fn view(state: &AppState, issued: IssuedProblem) -> ProblemView {
    ProblemView::from_issued(issued, state.pool().tokens().ttl().as_secs())
}
