use super::common::{Ack, JsonBody};
use crate::{errors::ServiceError, handlers::AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/newsletter/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = Ack),
        (status = 400, description = "Valid email required", body = crate::errors::ErrorResponse)
    ),
    tag = "Newsletter"
)]
pub async fn subscribe(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SubscribeRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let outcome = state.services.newsletter.subscribe(&request.email).await?;
    Ok(Json(Ack::with_message(outcome.message())))
}

pub fn newsletter_routes() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe))
}
