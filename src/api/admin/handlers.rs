use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, start_of_day};
use crate::repositories;
use crate::schemas::student::{StudentDetailResponse, StudentSummaryResponse, StudentsQuery};
use crate::schemas::template::{
    CacheInvalidateResponse, CompletionResponse, PoolsResponse, PreviewResponse,
    TemplateCreate, TemplateResponse, TemplateStatsResponse, TemplateUpdate,
};
use crate::services::formula::Formula;
use crate::services::problem_generator::split_list;
use crate::services::problem_pool::PrewarmReport;

const TOP_STUDENTS_LIMIT: i64 = 10;

pub(super) async fn list_templates(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateResponse>>, ApiError> {
    let templates = repositories::templates::list(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list problem templates"))?;

    Ok(Json(templates.iter().map(TemplateResponse::from_db).collect()))
}

pub(super) async fn create_template(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<TemplateCreate>,
) -> Result<(StatusCode, Json<TemplateResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validate_formula(&payload.solution_formula, &payload.variables)?;

    let now = primitive_now_utc();
    let template = repositories::templates::create(
        state.db(),
        repositories::templates::CreateTemplate {
            name: payload.name.trim(),
            problem_text: &payload.problem_text,
            variables: &payload.variables,
            solution_formula: &payload.solution_formula,
            answer_count: payload.answer_count,
            answer_units: payload.answer_units.as_deref(),
            difficulty: payload.difficulty,
            image_filename: payload.image_filename.as_deref(),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create problem template"))?;

    tracing::info!(admin_id = %admin.id, template_id = template.id, "Problem template created");
    Ok((StatusCode::CREATED, Json(TemplateResponse::from_db(&template))))
}

pub(super) async fn get_template(
    Path(template_id): Path<i64>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = repositories::templates::find_by_id(state.db(), template_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load problem template"))?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    Ok(Json(TemplateResponse::from_db(&template)))
}

pub(super) async fn update_template(
    Path(template_id): Path<i64>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<TemplateUpdate>,
) -> Result<Json<TemplateResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if payload.solution_formula.is_some() || payload.variables.is_some() {
        let current = repositories::templates::find_by_id(state.db(), template_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load problem template"))?
            .ok_or_else(|| ApiError::template_not_found(template_id))?;
        validate_formula(
            payload.solution_formula.as_deref().unwrap_or(&current.solution_formula),
            payload.variables.as_deref().unwrap_or(&current.variables),
        )?;
    }

    let template = repositories::templates::update(
        state.db(),
        template_id,
        repositories::templates::UpdateTemplate {
            name: payload.name.map(|name| name.trim().to_string()),
            problem_text: payload.problem_text,
            variables: payload.variables,
            solution_formula: payload.solution_formula,
            answer_count: payload.answer_count,
            answer_units: payload.answer_units,
            difficulty: payload.difficulty,
            image_filename: payload.image_filename,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update problem template"))?
    .ok_or_else(|| ApiError::template_not_found(template_id))?;

    forget_template(&state, template_id).await?;
    tracing::info!(admin_id = %admin.id, template_id, "Problem template updated");
    Ok(Json(TemplateResponse::from_db(&template)))
}

pub(super) async fn delete_template(
    Path(template_id): Path<i64>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::templates::delete(state.db(), template_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete problem template"))?;
    if !deleted {
        return Err(ApiError::template_not_found(template_id));
    }

    forget_template(&state, template_id).await?;
    tracing::info!(admin_id = %admin.id, template_id, "Problem template deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn preview_template(
    Path(template_id): Path<i64>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let instance = state
        .pool()
        .preview(template_id)
        .await?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    Ok(Json(instance.into()))
}

pub(super) async fn template_stats(
    Path(template_id): Path<i64>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<TemplateStatsResponse>, ApiError> {
    let stats = repositories::responses::template_stats(state.db(), template_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load template statistics"))?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    Ok(Json(stats.into()))
}

pub(super) async fn invalidate_template_cache(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Json<CacheInvalidateResponse> {
    let cleared = state.templates().invalidate_all().await;
    tracing::info!(admin_id = %admin.id, cleared, "Template cache invalidated");
    Json(CacheInvalidateResponse { cleared })
}

pub(super) async fn pool_status(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PoolsResponse>, ApiError> {
    let pool = state.pool();
    Ok(Json(PoolsResponse {
        backend: pool.cache_backend(),
        target_size: pool.config().target_size,
        low_water: pool.config().low_water,
        cached_templates: state.templates().cached_count().await,
        pools: pool.status().await?,
    }))
}

pub(super) async fn prewarm_pools(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PrewarmReport>, ApiError> {
    let report = state.pool().prewarm().await?;
    tracing::info!(admin_id = %admin.id, generated = report.generated, "Pools prewarmed on demand");
    Ok(Json(report))
}

pub(super) async fn completion(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let day_start = start_of_day(primitive_now_utc());
    let summary = repositories::responses::completion_summary(state.db(), day_start)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load completion summary"))?;
    let top = repositories::responses::top_students(state.db(), TOP_STUDENTS_LIMIT)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load top students"))?;

    Ok(Json(CompletionResponse::new(summary, top)))
}

pub(super) async fn list_students(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(query): Query<StudentsQuery>,
) -> Result<Json<PaginatedResponse<StudentSummaryResponse>>, ApiError> {
    let page = query.page();
    let rows =
        repositories::responses::students(state.db(), query.completed, page.skip, page.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list students"))?;

    let total_count = rows.first().map(|row| row.total_count).unwrap_or(0);
    let items = rows.into_iter().map(StudentSummaryResponse::from).collect();
    Ok(Json(PaginatedResponse::new(items, total_count, page)))
}

pub(super) async fn student_detail(
    Path(student_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<StudentDetailResponse>, ApiError> {
    let student = repositories::users::find_by_id(state.db(), &student_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load student"))?
        .filter(|user| !user.is_admin)
        .ok_or_else(|| ApiError::NotFound(format!("Student {student_id} not found")))?;

    let problems = repositories::responses::student_problem_stats(state.db(), &student.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load student statistics"))?;

    Ok(Json(StudentDetailResponse::new(student, problems)))
}

/// Drops the cached template and its pool so the next fetch sees the change.
async fn forget_template(state: &AppState, template_id: i64) -> Result<(), ApiError> {
    state.templates().invalidate(template_id).await;
    state.pool().clear(template_id).await?;
    Ok(())
}

fn validate_formula(source: &str, variables: &str) -> Result<(), ApiError> {
    let formula = Formula::parse(source)
        .map_err(|err| ApiError::BadRequest(format!("Invalid solution formula: {err}")))?;

    let declared = split_list(variables);
    let undeclared: Vec<String> = formula
        .free_symbols()
        .into_iter()
        .filter(|symbol| !declared.contains(symbol))
        .collect();
    if undeclared.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Formula references undeclared variables: {}",
            undeclared.join(", ")
        )))
    }
}
