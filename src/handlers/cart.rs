use super::common::{Ack, JsonBody};
use crate::{
    auth::{AuthUser, MaybeUser},
    errors::ServiceError,
    handlers::AppState,
    services::{
        cart::{merge_carts, CartLine, CartQuantity, CartState, StoredCartLine},
        cart_tracking::{CartTracker, CartUserInfo},
    },
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<StoredCartLine>,
}

#[derive(Debug, Deserialize)]
pub struct SyncCartRequest {
    #[serde(default)]
    pub items: Vec<CartQuantity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartRequest {
    #[serde(default)]
    pub guest_items: Vec<CartLine>,
    #[serde(default)]
    pub user_items: Vec<CartLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartNotifyRequest {
    pub session_id: Option<String>,
    pub cart_items: Option<Vec<CartLine>>,
    pub user_info: Option<CartUserInfo>,
}

/// Stored cart of the signed-in user; empty for anonymous callers
#[utoipa::path(
    get,
    path = "/api/cart",
    responses((status = 200, description = "Cart lines joined with the catalog")),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<CartResponse>, ServiceError> {
    let items = match user {
        Some(user) => state.services.cart.get_cart(user.user_id).await?,
        None => Vec::new(),
    };
    Ok(Json(CartResponse { items }))
}

/// Replace the stored cart
#[utoipa::path(
    post,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart stored", body = Ack),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn sync_cart(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<SyncCartRequest>,
) -> Result<Json<Ack>, ServiceError> {
    state
        .services
        .cart
        .replace_cart(user.user_id, &request.items)
        .await?;
    Ok(Json(Ack::ok()))
}

/// Merge a guest cart into the user's cart
#[utoipa::path(
    post,
    path = "/api/cart/merge",
    responses(
        (status = 200, description = "Merged cart with totals"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn merge_cart(JsonBody(request): JsonBody<MergeCartRequest>) -> Json<CartState> {
    Json(CartState::from_items(merge_carts(
        &request.guest_items,
        &request.user_items,
    )))
}

/// Record cart activity for abandonment tracking
#[utoipa::path(
    post,
    path = "/api/cart/notify",
    responses(
        (status = 200, description = "Session tracked", body = Ack),
        (status = 400, description = "Missing required fields", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn notify_cart(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CartNotifyRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let (Some(session_id), Some(items)) = (
        request.session_id.filter(|s| !s.trim().is_empty()),
        request.cart_items,
    ) else {
        return Err(ServiceError::BadRequest(
            "Missing required fields".to_string(),
        ));
    };

    let session = state
        .cart_tracker
        .track_update(&session_id, items, request.user_info)
        .await?;

    if CartTracker::wants_cart_notification(&session) {
        let tracker = state.cart_tracker.clone();
        tokio::spawn(async move {
            if let Err(e) = tracker.send_cart_notification(&session).await {
                warn!(session_id = %session.session_id, error = %e, "cart notification failed");
            }
        });
    }

    info!(%session_id, "cart activity recorded");
    Ok(Json(Ack::ok()))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(sync_cart))
        .route("/merge", post(merge_cart))
        .route("/notify", post(notify_cart))
}
