use super::common::JsonBody;
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::payments::{
        CreatePaymentRequest, CreatePaymentResponse, PaymentsPublicConfig, VerifyPaymentRequest,
        VerifyPaymentResponse, WebhookOutcome,
    },
};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";
const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Publishable gateway key for the browser checkout
#[utoipa::path(
    get,
    path = "/api/payments/config",
    responses((status = 200, description = "Gateway key id", body = PaymentsPublicConfig)),
    tag = "Payments"
)]
pub async fn payment_config(State(state): State<AppState>) -> Json<PaymentsPublicConfig> {
    Json(state.services.payments.public_config())
}

/// Open a gateway order for a local order
#[utoipa::path(
    post,
    path = "/api/payments/create-order",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Gateway order created", body = CreatePaymentResponse),
        (status = 400, description = "Missing amount or unsupported gateway", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ServiceError> {
    let created = state.services.payments.create_payment(request).await?;
    Ok(Json(created))
}

/// Check the checkout signature and mark the order paid
#[utoipa::path(
    post,
    path = "/api/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Signature verified", body = VerifyPaymentResponse),
        (status = 400, description = "Missing payment data or bad signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ServiceError> {
    let verified = state.services.payments.verify_payment(request).await?;
    Ok(Json(verified))
}

/// Razorpay webhook; the signature covers the raw body
#[utoipa::path(
    post,
    path = "/api/payments/webhooks/razorpay",
    request_body(content = String, content_type = "application/json", description = "Raw Razorpay event"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Missing or invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let outcome = state
        .services
        .payments
        .handle_webhook(
            &body,
            header_str(&headers, SIGNATURE_HEADER),
            header_str(&headers, EVENT_ID_HEADER),
        )
        .await?;
    if outcome != WebhookOutcome::Processed {
        debug!(?outcome, "webhook delivery not applied");
    }
    Ok(Json(json!({ "status": "ok" })))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(payment_config))
        .route("/create-order", post(create_payment))
        .route("/verify", post(verify_payment))
        .route("/webhooks/razorpay", post(razorpay_webhook))
}
