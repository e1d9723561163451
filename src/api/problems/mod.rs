mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_problems))
        .route("/history", get(handlers::history))
        .route("/:template_id", get(handlers::get_problem))
        .route("/:template_id/refresh", post(handlers::refresh_problem))
        .route("/:template_id/submit", post(handlers::submit_answers))
}
