use super::common::{Ack, JsonBody};
use crate::{
    auth::AuthUser, errors::ServiceError, handlers::AppState, services::wishlist::WishlistItem,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub items: Vec<WishlistItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistChange {
    pub product_id: Option<String>,
}

fn parse_product_id(raw: Option<&str>, missing: &str) -> Result<Uuid, ServiceError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::BadRequest(missing.to_string()))?;
    Uuid::parse_str(raw).map_err(|_| ServiceError::BadRequest("Invalid productId".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/wishlist",
    responses(
        (status = 200, description = "Saved products, newest first"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn get_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<WishlistResponse>, ServiceError> {
    let items = state.services.wishlist.list(user.user_id).await?;
    Ok(Json(WishlistResponse { items }))
}

#[utoipa::path(
    post,
    path = "/api/wishlist",
    responses(
        (status = 200, description = "Saved", body = Ack),
        (status = 400, description = "Invalid productId", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(change): JsonBody<WishlistChange>,
) -> Result<Json<Ack>, ServiceError> {
    let product_id = parse_product_id(change.product_id.as_deref(), "Invalid productId")?;
    state.services.wishlist.add(user.user_id, product_id).await?;
    Ok(Json(Ack::ok()))
}

#[utoipa::path(
    delete,
    path = "/api/wishlist",
    params(("productId" = String, Query, description = "Product to remove")),
    responses(
        (status = 200, description = "Removed", body = Ack),
        (status = 400, description = "Missing productId", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Wishlist"
)]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    Query(change): Query<WishlistChange>,
) -> Result<Json<Ack>, ServiceError> {
    let product_id = parse_product_id(change.product_id.as_deref(), "Missing productId")?;
    state.services.wishlist.remove(user.user_id, product_id).await?;
    Ok(Json(Ack::ok()))
}

pub fn wishlist_routes() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_wishlist)
            .post(add_to_wishlist)
            .delete(remove_from_wishlist),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_errors() {
        assert!(matches!(
            parse_product_id(None, "Missing productId"),
            Err(ServiceError::BadRequest(msg)) if msg == "Missing productId"
        ));
        assert!(matches!(
            parse_product_id(Some("nope"), "Missing productId"),
            Err(ServiceError::BadRequest(msg)) if msg == "Invalid productId"
        ));
        let id = Uuid::new_v4();
        assert_eq!(parse_product_id(Some(&id.to_string()), "x").unwrap(), id);
    }
}
