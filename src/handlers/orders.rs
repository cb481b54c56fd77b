use super::common::{Ack, JsonBody};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    events::Event,
    handlers::AppState,
    services::orders::{CreateUpiOrderRequest, OrderDetail, UpiOrderCreated},
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderEnvelope {
    pub order: OrderDetail,
}

#[derive(Debug, Deserialize)]
pub struct PaymentProofRequest {
    pub id: Uuid,
    pub upi_transaction_id: Option<String>,
    pub payment_screenshot_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub whatsapp_consent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub order_id: Option<String>,
    pub customer_info: Option<CustomerInfo>,
    pub order_total: Option<Decimal>,
    pub session_id: Option<String>,
}

/// Place a UPI order priced from the catalog
#[utoipa::path(
    post,
    path = "/api/orders/create-upi",
    request_body = CreateUpiOrderRequest,
    responses(
        (status = 200, description = "Order created with UPI payment links", body = UpiOrderCreated),
        (status = 400, description = "Invalid payload, unavailable product or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in"),
        (status = 409, description = "Duplicate order number", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_upi_order(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreateUpiOrderRequest>,
) -> Result<Json<UpiOrderCreated>, ServiceError> {
    let created = state
        .services
        .orders
        .create_upi_order(user.user_id, request)
        .await?;
    Ok(Json(created))
}

/// The caller's own order with its lines
#[utoipa::path(
    get,
    path = "/api/orders/get",
    params(("id" = String, Query, description = "Order id")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 400, description = "Missing id", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderQuery>,
) -> Result<Json<OrderEnvelope>, ServiceError> {
    let raw = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest("Missing id".to_string()))?;
    // A malformed id cannot belong to the caller.
    let order_id = Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::NotFound("Order not found".to_string()))?;
    let order = state
        .services
        .orders
        .get_for_user(user.user_id, order_id)
        .await?;
    Ok(Json(OrderEnvelope { order }))
}

/// Attach the customer's UPI reference or payment screenshot
#[utoipa::path(
    post,
    path = "/api/orders/update-proof",
    responses(
        (status = 200, description = "Proof recorded", body = Ack),
        (status = 404, description = "Not the caller's order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_payment_proof(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<PaymentProofRequest>,
) -> Result<Json<Ack>, ServiceError> {
    state
        .services
        .orders
        .update_payment_proof(
            user.user_id,
            request.id,
            request.upi_transaction_id,
            request.payment_screenshot_url,
        )
        .await?;
    Ok(Json(Ack::ok()))
}

/// Post-checkout confirmation: WhatsApp message on consent, tracker session closed
#[utoipa::path(
    post,
    path = "/api/orders/confirm",
    responses(
        (status = 200, description = "Confirmation queued", body = Ack),
        (status = 400, description = "Missing required fields", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ConfirmOrderRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let (Some(order_reference), Some(customer), Some(total)) = (
        request.order_id.filter(|id| !id.trim().is_empty()),
        request.customer_info,
        request.order_total.filter(|t| !t.is_zero()),
    ) else {
        return Err(ServiceError::BadRequest(
            "Missing required fields".to_string(),
        ));
    };

    if let Some(phone_number) = customer
        .phone_number
        .filter(|p| !p.trim().is_empty() && customer.whatsapp_consent)
    {
        state
            .event_sender
            .publish(Event::CustomerOrderConfirmed {
                order_reference: order_reference.clone(),
                customer_name: customer.name.unwrap_or_else(|| "Customer".to_string()),
                phone_number,
                total,
            })
            .await;
    }

    if let Some(session_id) = request.session_id.filter(|s| !s.is_empty()) {
        state.cart_tracker.mark_completed(&session_id).await?;
    }

    info!(%order_reference, "order confirmation handled");
    Ok(Json(Ack::ok()))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/create-upi", post(create_upi_order))
        .route("/get", get(get_order))
        .route("/update-proof", post(update_payment_proof))
        .route("/confirm", post(confirm_order))
}
