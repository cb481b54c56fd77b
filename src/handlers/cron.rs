use crate::{auth::verify_cron_secret, handlers::AppState};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct AutoCancelResult {
    pub success: bool,
    pub cancelled: u64,
}

/// Cancel UPI orders left unpaid past the configured timeout
#[utoipa::path(
    post,
    path = "/api/cron/auto-cancel-pending",
    responses(
        (status = 200, description = "Number of orders cancelled"),
        (status = 401, description = "Missing or wrong cron secret")
    ),
    security(("cron_secret" = [])),
    tag = "Integrations"
)]
pub async fn auto_cancel_pending(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = verify_cron_secret(&headers, state.config.cron_secret.as_deref()) {
        return rejection.into_response();
    }
    match state.services.orders.auto_cancel_pending(Utc::now()).await {
        Ok(cancelled) => {
            info!(cancelled, "auto-cancel run finished");
            Json(AutoCancelResult {
                success: true,
                cancelled,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub fn cron_routes() -> Router<AppState> {
    Router::new().route("/auto-cancel-pending", post(auto_cancel_pending))
}
