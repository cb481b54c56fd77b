use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{product, wishlist},
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub category: Option<String>,
    pub image: String,
    pub in_stock: bool,
}

impl From<product::Model> for WishlistItem {
    fn from(p: product::Model) -> Self {
        Self {
            image: p.primary_image(),
            in_stock: p.in_stock(),
            id: p.id,
            name: p.name,
            price: p.price,
            original_price: p.original_price,
            category: p.category,
        }
    }
}

#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest first; rows whose product no longer exists are skipped
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WishlistItem>, ServiceError> {
        let rows = wishlist::Entity::find()
            .filter(wishlist::Column::UserId.eq(user_id))
            .order_by_desc(wishlist::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, product)| product.map(WishlistItem::from))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let row = wishlist::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        };
        wishlist::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([wishlist::Column::UserId, wishlist::Column::ProductId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        info!("wishlist item saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let result = wishlist::Entity::delete_many()
            .filter(wishlist::Column::UserId.eq(user_id))
            .filter(wishlist::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        info!(removed = result.rows_affected, "wishlist item removed");
        Ok(())
    }
}
