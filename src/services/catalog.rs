use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Select, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    config::StoreConfig,
    entities::product,
    errors::ServiceError,
    services::pricing::{CheckoutTotals, PricingRules, TaxPolicy},
};

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

/// Storefront listing filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub featured: Option<bool>,
    /// Matched against name and description
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
}

impl ProductFilter {
    fn apply(&self, mut query: Select<product::Entity>) -> Select<product::Entity> {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(featured) = self.featured {
            query = query.filter(product::Column::Featured.eq(featured));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(search))
                    .add(product::Column::Description.contains(search)),
            );
        }
        if let Some(min) = self.min_price {
            query = query.filter(product::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            query = query.filter(product::Column::Price.lte(max));
        }
        match self.sort {
            ProductSort::Newest => query.order_by_desc(product::Column::CreatedAt),
            ProductSort::PriceAsc => query.order_by_asc(product::Column::Price),
            ProductSort::PriceDesc => query.order_by_desc(product::Column::Price),
            ProductSort::Name => query.order_by_asc(product::Column::Name),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub fabric: Option<String>,
    pub color: Option<String>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial product edit; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub fabric: Option<String>,
    pub color: Option<String>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    pub images: Option<Vec<String>>,
    pub featured: Option<bool>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuoteLine {
    pub id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    pub items: Vec<QuoteLine>,
    #[serde(default)]
    pub apply_tax: bool,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub product: product::Model,
    pub in_stock: bool,
    pub image: String,
}

impl From<product::Model> for ProductView {
    fn from(product: product::Model) -> Self {
        Self {
            in_stock: product.in_stock(),
            image: product.primary_image(),
            product,
        }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    pricing: PricingRules,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, store: &StoreConfig) -> Self {
        Self {
            db,
            pricing: PricingRules::from(store),
        }
    }

    /// Active products only
    #[instrument(skip(self))]
    pub async fn list_active(
        &self,
        filter: &ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let query = filter.apply(product::Entity::find().filter(product::Column::Active.eq(true)));
        self.page_of(query, page, per_page).await
    }

    /// Back-office listing, disabled products included
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        filter: &ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        self.page_of(filter.apply(product::Entity::find()), page, per_page)
            .await
    }

    async fn page_of(
        &self,
        query: Select<product::Entity>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get_active(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .filter(product::Column::Active.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: ProductInput) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            original_price: Set(input.original_price),
            category: Set(input.category),
            subcategory: Set(input.subcategory),
            fabric: Set(input.fabric),
            color: Set(input.color),
            stock_quantity: Set(input.stock_quantity),
            images: Set(json!(input.images)),
            featured: Set(input.featured),
            active: Set(input.active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: ProductPatch) -> Result<product::Model, ServiceError> {
        patch.validate()?;
        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = patch.price {
            active.price = Set(price);
        }
        if let Some(original_price) = patch.original_price {
            active.original_price = Set(Some(original_price));
        }
        if let Some(category) = patch.category {
            active.category = Set(Some(category));
        }
        if let Some(subcategory) = patch.subcategory {
            active.subcategory = Set(Some(subcategory));
        }
        if let Some(fabric) = patch.fabric {
            active.fabric = Set(Some(fabric));
        }
        if let Some(color) = patch.color {
            active.color = Set(Some(color));
        }
        if let Some(stock) = patch.stock_quantity {
            active.stock_quantity = Set(Some(stock));
        }
        if let Some(images) = patch.images {
            active.images = Set(json!(images));
        }
        if let Some(featured) = patch.featured {
            active.featured = Set(featured);
        }
        if let Some(is_active) = patch.active {
            active.active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(product_id = %id, "product updated");
        Ok(updated)
    }

    /// Soft delete: ordered products stay referenced by order items
    #[instrument(skip(self))]
    pub async fn disable(&self, id: Uuid) -> Result<(), ServiceError> {
        self.update(
            id,
            ProductPatch {
                active: Some(false),
                ..Default::default()
            },
        )
        .await?;
        info!(product_id = %id, "product disabled");
        Ok(())
    }

    /// Totals recomputed from current catalog prices
    #[instrument(skip(self, request))]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<CheckoutTotals, ServiceError> {
        if request.items.iter().any(|line| line.quantity <= 0) {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }
        let discount = request.discount.unwrap_or(Decimal::ZERO);
        if discount.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "discount must not be negative".to_string(),
            ));
        }

        let ids: Vec<Uuid> = request.items.iter().map(|line| line.id).collect();
        let prices: HashMap<Uuid, Decimal> = if ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(ids))
                .filter(product::Column::Active.eq(true))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p.price))
                .collect()
        };

        let mut lines = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let price = prices.get(&line.id).copied().ok_or_else(|| {
                ServiceError::ProductUnavailable("One or more products unavailable".to_string())
            })?;
            lines.push((price, line.quantity));
        }

        let tax = if request.apply_tax {
            TaxPolicy::Apply
        } else {
            TaxPolicy::Omit
        };
        Ok(self.pricing.totals(lines, tax, discount))
    }
}
