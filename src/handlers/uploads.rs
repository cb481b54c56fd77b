use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::AppState,
    services::payment_proofs::UploadedProof,
};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;
use uuid::Uuid;

const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProofUploadQuery {
    /// Id of the caller's order
    pub order_id: Option<String>,
}

/// Upload a payment screenshot for one of the caller's orders
#[utoipa::path(
    post,
    path = "/api/upload/payment-proof",
    params(ProofUploadQuery),
    request_body(content = String, content_type = "multipart/form-data", description = "`file` part holding the image"),
    responses(
        (status = 200, description = "Stored; public URL returned", body = UploadedProof),
        (status = 400, description = "Missing orderId or file", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Not the caller's order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn upload_payment_proof(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProofUploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadedProof>, ServiceError> {
    let Some(order_ref) = query.order_id.filter(|id| !id.trim().is_empty()) else {
        return Err(ServiceError::BadRequest("Missing orderId".to_string()));
    };
    let order_id = Uuid::parse_str(order_ref.trim())
        .map_err(|_| ServiceError::NotFound("Order not found".to_string()))?;

    let mut multipart = multipart.map_err(|rejection| {
        debug!(error = %rejection, "upload is not multipart");
        ServiceError::BadRequest("Missing file".to_string())
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!(error = %e, "unreadable multipart body");
        ServiceError::BadRequest("Invalid upload".to_string())
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|e| {
            debug!(error = %e, "upload body rejected");
            ServiceError::BadRequest("Invalid upload".to_string())
        })?;
        upload = Some((bytes, content_type));
        break;
    }
    let Some((bytes, content_type)) = upload else {
        return Err(ServiceError::BadRequest("Missing file".to_string()));
    };

    let proof = state
        .services
        .payment_proofs
        .upload(user.user_id, order_id, bytes.to_vec(), content_type.as_deref())
        .await?;
    Ok(Json(proof))
}

pub fn upload_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/payment-proof", post(upload_payment_proof))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
