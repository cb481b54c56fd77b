use super::common::{Ack, JsonBody};
use crate::{
    auth::AuthUser,
    entities::address,
    errors::ServiceError,
    handlers::AppState,
    services::addresses::AddressInput,
};
use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub id: Uuid,
    pub name: String,
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub is_default: bool,
}

impl From<address::Model> for AddressView {
    fn from(a: address::Model) -> Self {
        Self {
            id: a.id,
            name: a.name,
            full_name: a.full_name,
            phone: a.phone,
            address_line1: a.address_line1,
            address_line2: a.address_line2,
            city: a.city,
            state: a.state,
            pincode: a.pincode,
            is_default: a.is_default,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddressList {
    pub addresses: Vec<AddressView>,
}

#[derive(Debug, Serialize)]
pub struct AddressSaved {
    pub success: bool,
    pub address: AddressView,
}

#[utoipa::path(
    get,
    path = "/api/addresses",
    responses(
        (status = 200, description = "Saved addresses, default first"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AddressList>, ServiceError> {
    let addresses = state.services.addresses.list(user.user_id).await?;
    Ok(Json(AddressList {
        addresses: addresses.into_iter().map(AddressView::from).collect(),
    }))
}

/// Create, or edit when `id` is present
#[utoipa::path(
    post,
    path = "/api/addresses",
    request_body = AddressInput,
    responses(
        (status = 200, description = "Address saved"),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown address", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Addresses"
)]
pub async fn save_address(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<AddressInput>,
) -> Result<Json<AddressSaved>, ServiceError> {
    let saved = state.services.addresses.save(user.user_id, input).await?;
    Ok(Json(AddressSaved {
        success: true,
        address: saved.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address deleted", body = Ack),
        (status = 404, description = "Unknown address", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Addresses"
)]
pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Ack>, ServiceError> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(Json(Ack::ok()))
}

pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(save_address))
        .route("/:id", delete(delete_address))
}
