mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(handlers::list_templates).post(handlers::create_template))
        .route("/templates/cache/invalidate", post(handlers::invalidate_template_cache))
        .route(
            "/templates/:template_id",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route("/templates/:template_id/preview", post(handlers::preview_template))
        .route("/templates/:template_id/stats", get(handlers::template_stats))
        .route("/pools", get(handlers::pool_status))
        .route("/pools/prewarm", post(handlers::prewarm_pools))
        .route("/completion", get(handlers::completion))
        .route("/students", get(handlers::list_students))
        .route("/students/:student_id", get(handlers::student_detail))
}
