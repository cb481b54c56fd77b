use super::common::JsonBody;
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::{catalog::QuoteRequest, pricing::CheckoutTotals},
};
use axum::{extract::State, routing::post, Json, Router};

/// Totals recomputed from current catalog prices
#[utoipa::path(
    post,
    path = "/api/checkout/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Checkout totals"),
        (status = 400, description = "Unknown or inactive product", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<QuoteRequest>,
) -> Result<Json<CheckoutTotals>, ServiceError> {
    Ok(Json(state.services.catalog.quote(&request).await?))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/quote", post(quote))
}
