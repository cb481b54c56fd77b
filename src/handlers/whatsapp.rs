use super::common::JsonBody;
use crate::{
    errors::ServiceError, handlers::AppState, notifications::whatsapp::is_valid_whatsapp_number,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

const MESSAGE_TYPES: [&str; 4] = [
    "cart_update",
    "cart_abandonment",
    "order_confirmation",
    "shipping_update",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub to: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub customer_id: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// What an inbound customer message is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundIntent {
    OrderStatus,
    Cart,
    Support,
    OptOut,
    Other,
}

/// Keyword match, first rule wins
pub fn classify_inbound(text: &str) -> InboundIntent {
    let text = text.to_lowercase();
    let has = |needle: &str| text.contains(needle);
    if has("order status") || has("track order") {
        InboundIntent::OrderStatus
    } else if has("cart") || has("checkout") {
        InboundIntent::Cart
    } else if has("help") || has("support") {
        InboundIntent::Support
    } else if has("stop") || has("unsubscribe") {
        InboundIntent::OptOut
    } else {
        InboundIntent::Other
    }
}

/// Send an ad-hoc WhatsApp text
#[utoipa::path(
    post,
    path = "/api/whatsapp/send-message",
    responses(
        (status = 200, description = "Message accepted by the provider"),
        (status = 400, description = "Missing fields or invalid number", body = crate::errors::ErrorResponse),
        (status = 500, description = "Not configured or provider failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Integrations"
)]
pub async fn send_message(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ServiceError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(to), Some(message), Some(kind), Some(customer_id)) = (
        non_empty(request.to),
        non_empty(request.message),
        non_empty(request.kind),
        non_empty(request.customer_id),
    ) else {
        return Err(ServiceError::BadRequest(
            "Missing required fields".to_string(),
        ));
    };
    if !MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(ServiceError::BadRequest("Invalid message type".to_string()));
    }
    if !is_valid_whatsapp_number(&to) {
        return Err(ServiceError::BadRequest(
            "Invalid WhatsApp number format".to_string(),
        ));
    }

    let message_id = state.whatsapp.send_text(&to, &message).await?;
    info!(
        ?message_id,
        kind = %kind,
        %customer_id,
        order_id = ?request.order_id,
        "WhatsApp message sent"
    );
    Ok(Json(SendMessageResponse {
        success: true,
        message_id,
        message: "WhatsApp message sent successfully",
    }))
}

/// Meta subscription handshake
#[utoipa::path(
    get,
    path = "/api/whatsapp/webhook",
    responses(
        (status = 200, description = "Echoed challenge"),
        (status = 403, description = "Verify token mismatch")
    ),
    tag = "Integrations"
)]
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let expected = state
        .config
        .whatsapp
        .webhook_verify_token
        .as_deref()
        .filter(|t| !t.is_empty());
    match (query.mode.as_deref(), query.verify_token.as_deref(), expected) {
        (Some("subscribe"), Some(token), Some(expected)) if token == expected => {
            info!("WhatsApp webhook verified");
            query.challenge.unwrap_or_default().into_response()
        }
        _ => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
    }
}

/// Inbound messages; classified and logged
#[utoipa::path(
    post,
    path = "/api/whatsapp/webhook",
    responses((status = 200, description = "Acknowledged")),
    tag = "Integrations"
)]
pub async fn receive_webhook(JsonBody(body): JsonBody<Value>) -> Json<Value> {
    let change = body.pointer("/entry/0/changes/0");
    let is_message = change
        .and_then(|c| c.get("field"))
        .and_then(Value::as_str)
        == Some("messages");

    if let Some(message) = change
        .filter(|_| is_message)
        .and_then(|c| c.pointer("/value/messages/0"))
    {
        let from = message.get("from").and_then(Value::as_str).unwrap_or_default();
        let text = message
            .pointer("/text/body")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match classify_inbound(text) {
            InboundIntent::OptOut => warn!(%from, "customer asked to stop WhatsApp updates"),
            intent => info!(%from, ?intent, "inbound WhatsApp message"),
        }
    }

    Json(json!({ "status": "ok" }))
}

pub fn whatsapp_routes() -> Router<AppState> {
    Router::new()
        .route("/send-message", post(send_message))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("What is my ORDER STATUS?", InboundIntent::OrderStatus)]
    #[case("please track order 42", InboundIntent::OrderStatus)]
    #[case("my cart is empty", InboundIntent::Cart)]
    #[case("need help", InboundIntent::Support)]
    #[case("STOP", InboundIntent::OptOut)]
    #[case("hello", InboundIntent::Other)]
    fn classifies_inbound_text(#[case] text: &str, #[case] intent: InboundIntent) {
        assert_eq!(classify_inbound(text), intent);
    }
}
