use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError, services::orders::OrderService, storage::ObjectStorage,
};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadedProof {
    pub url: String,
}

/// Stores payment-proof screenshots for a customer's own orders
pub struct PaymentProofService {
    storage: Arc<dyn ObjectStorage>,
    orders: Arc<OrderService>,
    bucket: String,
}

impl PaymentProofService {
    pub fn new(storage: Arc<dyn ObjectStorage>, orders: Arc<OrderService>, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            orders,
            bucket: bucket.into(),
        }
    }

    /// Object key: `proofs/{user}/{order}-{millis}.jpg`
    pub fn object_path(user_id: Uuid, order_id: Uuid, millis: i64) -> String {
        format!("proofs/{}/{}-{}.jpg", user_id, order_id, millis)
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadedProof, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::BadRequest("Missing file".to_string()));
        }
        // 404 for orders of other customers
        self.orders.get_for_user(user_id, order_id).await?;

        let path = Self::object_path(user_id, order_id, Utc::now().timestamp_millis());
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        self.storage
            .put_object(&self.bucket, &path, bytes, content_type)
            .await?;

        let url = self.storage.public_url(&self.bucket, &path)?;
        info!(%order_id, "payment proof stored");
        Ok(UploadedProof { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_is_scoped_to_user_and_order() {
        let user = Uuid::nil();
        let order = Uuid::from_u128(7);
        assert_eq!(
            PaymentProofService::object_path(user, order, 1_717_171_717_000),
            format!("proofs/{}/{}-1717171717000.jpg", user, order)
        );
    }
}
