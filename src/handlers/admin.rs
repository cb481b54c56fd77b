//! Back-office routes. Every handler takes [`AdminUser`], so anonymous callers
//! get 401 and signed-in customers get 403 before any work is done.

use super::common::{Ack, JsonBody, PaginatedResponse, PaginationParams};
use crate::{
    auth::AdminUser,
    entities::order,
    errors::ServiceError,
    handlers::AppState,
    services::{
        analytics::Dashboard,
        cart_tracking::CartSessionOverview,
        orders::{FulfilmentUpdate, OrderListFilter, PendingOrder, StatusChange},
    },
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub id: Option<String>,
    pub upi_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub id: Option<String>,
    #[serde(flatten)]
    pub update: FulfilmentUpdate,
}

#[derive(Debug, Serialize)]
pub struct PendingOrders {
    pub orders: Vec<PendingOrder>,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdated {
    pub success: bool,
    pub order: order::Model,
}

#[derive(Debug, Serialize)]
pub struct SettingsEnvelope {
    pub settings: Value,
}

#[derive(Debug, Deserialize)]
pub struct SaveSettingsRequest {
    pub settings: Option<Value>,
}

fn required_id(raw: Option<&str>) -> Result<Uuid, ServiceError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("Missing id".to_string()))?;
    Uuid::parse_str(raw).map_err(|_| ServiceError::NotFound("Order not found".to_string()))
}

/// Manually verify a UPI payment
#[utoipa::path(
    post,
    path = "/api/admin/orders/mark-paid",
    responses(
        (status = 200, description = "Payment verified (or already verified)", body = Ack),
        (status = 400, description = "Missing id or order not payable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<MarkPaidRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let order_id = required_id(request.id.as_deref())?;
    let change = state
        .services
        .orders
        .mark_paid(order_id, admin.user_id, request.upi_transaction_id)
        .await?;
    if change == StatusChange::Unchanged {
        info!(%order_id, "mark-paid repeated on verified order");
    }
    Ok(Json(Ack::ok()))
}

#[utoipa::path(
    post,
    path = "/api/admin/orders/cancel",
    responses(
        (status = 200, description = "Order cancelled", body = Ack),
        (status = 400, description = "Missing id or payment already settled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<CancelRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let order_id = required_id(request.id.as_deref())?;
    state.services.orders.cancel(order_id).await?;
    info!(%order_id, admin_id = %admin.user_id, "order cancelled by admin");
    Ok(Json(Ack::ok()))
}

/// Manual verification queue, newest first
#[utoipa::path(
    get,
    path = "/api/admin/orders/pending",
    responses(
        (status = 200, description = "Orders awaiting payment verification"),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn pending_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<PendingOrders>, ServiceError> {
    let orders = state.services.orders.list_pending().await?;
    Ok(Json(PendingOrders { orders }))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(
        ("status" = Option<String>, Query, description = "Order status"),
        ("paymentStatus" = Option<String>, Query, description = "Payment status"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "Orders, newest first"),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<OrderListFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<order::Model>>, ServiceError> {
    let (page, per_page) = pagination.normalized();
    let (orders, total) = state
        .services
        .orders
        .list_orders(&filter, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(orders, page, per_page, total)))
}

/// Fulfilment transition; shipping queues a WhatsApp update
#[utoipa::path(
    post,
    path = "/api/admin/orders/update-status",
    responses(
        (status = 200, description = "Status changed"),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<UpdateStatusRequest>,
) -> Result<Json<StatusUpdated>, ServiceError> {
    let order_id = required_id(request.id.as_deref())?;
    let order = state
        .services
        .orders
        .update_fulfilment(order_id, request.update)
        .await?;
    info!(%order_id, status = %order.status, admin_id = %admin.user_id, "order status updated");
    Ok(Json(StatusUpdated {
        success: true,
        order,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses((status = 200, description = "Stored settings or defaults")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<SettingsEnvelope> {
    Json(SettingsEnvelope {
        settings: state.services.settings.get().await,
    })
}

#[utoipa::path(
    post,
    path = "/api/admin/settings",
    responses(
        (status = 200, description = "Settings saved", body = Ack),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn save_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(request): JsonBody<SaveSettingsRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let settings = request
        .settings
        .ok_or_else(|| ServiceError::BadRequest("Invalid payload".to_string()))?;
    state.services.settings.save(settings).await?;
    Ok(Json(Ack::with_message("Settings saved successfully")))
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    responses(
        (status = 200, description = "Dashboard aggregates", body = Dashboard),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn analytics(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Dashboard>, ServiceError> {
    Ok(Json(state.services.analytics.dashboard(Utc::now()).await?))
}

/// Tracked storefront carts
#[utoipa::path(
    get,
    path = "/api/admin/cart-sessions",
    responses((status = 200, description = "Abandoned and active cart sessions")),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn cart_sessions(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<CartSessionOverview>, ServiceError> {
    Ok(Json(state.cart_tracker.overview().await?))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/pending", get(pending_orders))
        .route("/orders/mark-paid", post(mark_paid))
        .route("/orders/cancel", post(cancel_order))
        .route("/orders/update-status", post(update_order_status))
        .route("/settings", get(get_settings).post(save_settings))
        .route("/analytics", get(analytics))
        .route("/cart-sessions", get(cart_sessions))
        .nest("/products", super::products::admin_product_routes())
}
