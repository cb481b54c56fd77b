use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Catalog product. Products are soft-disabled through `active`, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub original_price: Option<Decimal>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub fabric: Option<String>,
    pub color: Option<String>,
    /// `None` means stock is not tracked for this product
    pub stock_quantity: Option<i32>,
    /// JSON array of image URLs
    #[sea_orm(column_type = "Json")]
    pub images: Json,
    pub featured: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn image_urls(&self) -> Vec<String> {
        self.images
            .as_array()
            .map(|images| {
                images
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn primary_image(&self) -> String {
        self.image_urls()
            .into_iter()
            .next()
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
    }

    pub fn in_stock(&self) -> bool {
        self.stock_quantity.map(|s| s > 0).unwrap_or(true)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn product(images: Json, stock: Option<i32>) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Kanjivaram Silk".into(),
            description: None,
            price: dec!(4999),
            original_price: None,
            category: Some("Silk Sarees".into()),
            subcategory: None,
            fabric: None,
            color: None,
            stock_quantity: stock,
            images,
            featured: false,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn primary_image_falls_back_to_placeholder() {
        assert_eq!(product(json!([]), None).primary_image(), PLACEHOLDER_IMAGE);
        assert_eq!(
            product(json!(["/a.jpg", "/b.jpg"]), None).primary_image(),
            "/a.jpg"
        );
    }

    #[test]
    fn untracked_stock_counts_as_in_stock() {
        assert!(product(json!([]), None).in_stock());
        assert!(!product(json!([]), Some(0)).in_stock());
        assert!(product(json!([]), Some(3)).in_stock());
    }
}
