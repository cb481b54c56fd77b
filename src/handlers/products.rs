use super::common::{Ack, JsonBody, PaginatedResponse, PaginationParams};
use crate::{
    auth::AdminUser,
    entities::product,
    errors::ServiceError,
    handlers::AppState,
    services::catalog::{ProductFilter, ProductInput, ProductPatch, ProductView},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

/// List active products
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductFilter, PaginationParams),
    responses(
        (status = 200, description = "Active products, paginated"),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ProductView>>, ServiceError> {
    let (page, per_page) = pagination.normalized();
    let (products, total) = state
        .services
        .catalog
        .list_active(&filter, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(
        products.into_iter().map(ProductView::from).collect(),
        page,
        per_page,
        total,
    )))
}

/// Get one active product
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ProductView),
        (status = 404, description = "Missing or inactive", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalog"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductView>, ServiceError> {
    let product = state.services.catalog.get_active(id).await?;
    Ok(Json(product.into()))
}

/// Back-office product list, disabled products included
#[utoipa::path(
    get,
    path = "/api/admin/products",
    params(ProductFilter, PaginationParams),
    responses(
        (status = 200, description = "All products, paginated"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn admin_list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<ProductFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ProductView>>, ServiceError> {
    let (page, per_page) = pagination.normalized();
    let (products, total) = state
        .services
        .catalog
        .list_all(&filter, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(
        products.into_iter().map(ProductView::from).collect(),
        page,
        per_page,
        total,
    )))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = ProductInput,
    responses(
        (status = 201, description = "Product created", body = ProductView),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(input): JsonBody<ProductInput>,
) -> Result<(StatusCode, Json<ProductView>), ServiceError> {
    let created: product::Model = state.services.catalog.create(input).await?;
    info!(admin_id = %admin.user_id, product_id = %created.id, "admin created product");
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = ProductPatch,
    responses(
        (status = 200, description = "Product updated", body = ProductView),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    JsonBody(patch): JsonBody<ProductPatch>,
) -> Result<Json<ProductView>, ServiceError> {
    let updated = state.services.catalog.update(id, patch).await?;
    Ok(Json(updated.into()))
}

/// Soft delete
#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product disabled", body = Ack),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn disable_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack>, ServiceError> {
    state.services.catalog.disable(id).await?;
    Ok(Json(Ack::ok()))
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

pub fn admin_product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_products).post(create_product))
        .route("/:id", axum::routing::put(update_product).delete(disable_product))
}
