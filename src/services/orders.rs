//! Order placement, payment reconciliation and fulfilment.
//!
//! Every payment-status write is conditional on the row still being
//! `pending`, so an admin action, a gateway webhook and the auto-cancel job
//! racing on the same order cannot overwrite each other. The loser observes
//! the winner's state instead.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    config::AppConfig,
    entities::{order, order_item, product, profile},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_status::{
            ensure_order_transition, parse_order_status, parse_payment_status, OrderStatus,
            PaymentStatus,
        },
        pricing::{PricingRules, TaxPolicy},
        upi::{UpiPayment, UpiPaymentLinks},
    },
};

pub const PAYMENT_METHOD_UPI: &str = "UPI_QR";
const INVALID_PAYLOAD: &str = "Invalid payload";
const PRODUCTS_UNAVAILABLE: &str = "One or more products unavailable";
const INSUFFICIENT_STOCK: &str = "Insufficient stock";

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpiOrderItem {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Client-side price; informational only
    #[validate(custom = "non_negative")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUpiOrderRequest {
    #[validate(length(min = 3))]
    pub order_number: String,
    /// Client-computed amount; the stored total is recomputed from the catalog
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    #[validate(length(min = 1))]
    pub items: Vec<UpiOrderItem>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpiOrderCreated {
    pub success: bool,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub upi: UpiPaymentLinks,
}

/// Outcome of a conditional status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    /// The order was already in the requested state
    Unchanged,
}

/// Extra columns recorded when a payment is confirmed
#[derive(Debug, Clone, Default)]
pub struct PaymentConfirmation {
    pub verified_by: Option<Uuid>,
    pub upi_transaction_id: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<profile::Model> for CustomerSummary {
    fn from(p: profile::Model) -> Self {
        Self {
            id: p.id,
            full_name: p.full_name,
            email: p.email,
            phone: p.phone,
        }
    }
}

/// Row of the manual verification queue
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingOrder {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub order: order::Model,
    pub profile: Option<CustomerSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLineDetail {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub product: Option<ProductRef>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub order: order::Model,
    pub items: Vec<OrderLineDetail>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderListFilter {
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulfilmentUpdate {
    pub status: String,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<String>,
}

/// Order workflows shared by the storefront, admin and integration routes
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    fn pricing(&self) -> PricingRules {
        PricingRules::from(&self.config.store)
    }

    /// Places a UPI order for `user_id`.
    ///
    /// Totals and line prices come from the catalog. The order, its lines and
    /// the stock decrements are written in one transaction.
    #[instrument(skip(self, request), fields(order_number = %request.order_number, user_id = %user_id))]
    pub async fn create_upi_order(
        &self,
        user_id: Uuid,
        request: CreateUpiOrderRequest,
    ) -> Result<UpiOrderCreated, ServiceError> {
        let valid = request.validate().is_ok()
            && request.items.iter().all(|item| item.validate().is_ok())
            && request.shipping_address.is_object();
        if !valid {
            return Err(ServiceError::BadRequest(INVALID_PAYLOAD.to_string()));
        }

        // BTreeMap keeps lock order stable across concurrent checkouts
        let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &request.items {
            let total = requested.entry(item.product_id).or_default();
            *total = total
                .checked_add(item.quantity)
                .ok_or_else(|| ServiceError::BadRequest(INVALID_PAYLOAD.to_string()))?;
        }

        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(requested.keys().copied().collect::<Vec<_>>()))
            .filter(product::Column::Active.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        if products.len() != requested.len() {
            warn!(
                requested = requested.len(),
                found = products.len(),
                "order references unavailable products"
            );
            return Err(ServiceError::ProductUnavailable(PRODUCTS_UNAVAILABLE.to_string()));
        }

        for (product_id, quantity) in &requested {
            if let Some(stock) = products[product_id].stock_quantity {
                if *quantity > stock {
                    return Err(ServiceError::InsufficientStock(INSUFFICIENT_STOCK.to_string()));
                }
            }
        }

        let totals = self.pricing().totals(
            request
                .items
                .iter()
                .map(|item| (products[&item.product_id].price, item.quantity)),
            TaxPolicy::Omit,
            Decimal::ZERO,
        );

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start order transaction");
            ServiceError::DatabaseError(e)
        })?;

        let duplicate = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(request.order_number.as_str()))
            .count(&txn)
            .await?;
        if duplicate > 0 {
            return Err(ServiceError::Conflict(format!(
                "Order number {} already exists",
                request.order_number
            )));
        }

        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            order_number: Set(request.order_number.clone()),
            status: Set(OrderStatus::Pending.to_string()),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            payment_method: Set(Some(PAYMENT_METHOD_UPI.to_string())),
            payment_id: Set(None),
            gateway_order_id: Set(None),
            total_amount: Set(totals.total),
            shipping_address: Set(request.shipping_address.clone()),
            billing_address: Set(None),
            notes: Set(None),
            upi_transaction_id: Set(None),
            payment_screenshot_url: Set(None),
            verified_by: Set(None),
            verified_at: Set(None),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let lines = request.items.iter().map(|item| order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            price: Set(products[&item.product_id].price),
            created_at: Set(now),
        });
        order_item::Entity::insert_many(lines)
            .exec_without_returning(&txn)
            .await?;

        for (product_id, quantity) in &requested {
            if products[product_id].stock_quantity.is_none() {
                continue;
            }
            let updated = product::Entity::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(*quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(*product_id))
                .filter(product::Column::StockQuantity.gte(*quantity))
                .exec(&txn)
                .await?;
            if updated.rows_affected == 0 {
                warn!(%product_id, "stock changed during checkout");
                return Err(ServiceError::InsufficientStock(INSUFFICIENT_STOCK.to_string()));
            }
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(%order_id, total = %totals.total, lines = request.items.len(), "UPI order created");
        self.event_sender.publish(Event::OrderPlaced { order_id }).await;

        let store = &self.config.store;
        let upi = UpiPayment {
            payee_vpa: &store.upi_id,
            payee_name: store.payee_name(),
            amount: totals.total,
            currency: &store.currency,
            reference: &request.order_number,
        }
        .links();

        Ok(UpiOrderCreated {
            success: true,
            order_id,
            amount: totals.total,
            upi,
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Resolves an order from either its id or its order number
    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<order::Model>, ServiceError> {
        let condition = match Uuid::parse_str(reference.trim()) {
            Ok(id) => Condition::any().add(order::Column::Id.eq(id)),
            Err(_) => Condition::any().add(order::Column::OrderNumber.eq(reference.trim())),
        };
        Ok(order::Entity::find().filter(condition).one(&*self.db).await?)
    }

    /// Moves a pending payment to verified and the order to confirmed.
    ///
    /// Repeating the call on a settled order is a no-op and publishes nothing.
    #[instrument(skip(self, confirmation), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        confirmation: PaymentConfirmation,
    ) -> Result<StatusChange, ServiceError> {
        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Verified.to_string()),
            )
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Confirmed.to_string()))
            .col_expr(order::Column::VerifiedAt, Expr::value(now))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        if let Some(admin) = confirmation.verified_by {
            update = update.col_expr(order::Column::VerifiedBy, Expr::value(admin));
        }
        if let Some(txn_id) = confirmation.upi_transaction_id {
            update = update.col_expr(order::Column::UpiTransactionId, Expr::value(txn_id));
        }
        if let Some(payment_id) = confirmation.payment_id {
            update = update.col_expr(order::Column::PaymentId, Expr::value(payment_id));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            info!("payment verified");
            self.event_sender
                .publish(Event::PaymentVerified { order_id })
                .await;
            return Ok(StatusChange::Applied);
        }

        let current = self.find_order(order_id).await?;
        match parse_payment_status(&current.payment_status)? {
            status if status.is_settled() => Ok(StatusChange::Unchanged),
            status => Err(ServiceError::InvalidStatus(format!(
                "Cannot verify payment for an order whose payment is {}",
                status
            ))),
        }
    }

    /// Admin manual verification of a UPI transfer
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        admin_id: Uuid,
        upi_transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        self.confirm_payment(
            order_id,
            PaymentConfirmation {
                verified_by: Some(admin_id),
                upi_transaction_id: upi_transaction_id.filter(|v| !v.trim().is_empty()),
                payment_id: None,
            },
        )
        .await
    }

    async fn fail_pending(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed.to_string()),
            )
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Fails the payment and cancels the order. Settled orders are refused.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: Uuid) -> Result<StatusChange, ServiceError> {
        if self.fail_pending(order_id, Utc::now()).await? {
            info!("order cancelled");
            self.event_sender
                .publish(Event::PaymentFailed { order_id })
                .await;
            return Ok(StatusChange::Applied);
        }

        let current = self.find_order(order_id).await?;
        match parse_payment_status(&current.payment_status)? {
            PaymentStatus::Failed => Ok(StatusChange::Unchanged),
            status => Err(ServiceError::InvalidStatus(format!(
                "Cannot cancel an order whose payment is {}",
                status
            ))),
        }
    }

    /// Cancels orders still unpaid after the configured timeout. Returns how
    /// many were cancelled by this run.
    #[instrument(skip(self))]
    pub async fn auto_cancel_pending(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - Duration::minutes(self.config.store.pending_order_timeout_mins);
        let stale = order::Entity::find()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .filter(order::Column::CreatedAt.lte(cutoff))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0;
        for order in stale {
            match self.fail_pending(order.id, now).await {
                Ok(true) => {
                    cancelled += 1;
                    self.event_sender
                        .publish(Event::OrderAutoCancelled { order_id: order.id })
                        .await;
                }
                Ok(false) => {
                    info!(order_id = %order.id, "order settled before auto-cancel");
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "auto-cancel update failed");
                }
            }
        }

        info!(cancelled, %cutoff, "auto-cancel run finished");
        Ok(cancelled)
    }

    /// Manual verification queue, newest first
    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> Result<Vec<PendingOrder>, ServiceError> {
        let rows = order::Entity::find()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .order_by_desc(order::Column::CreatedAt)
            .find_also_related(profile::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, profile)| PendingOrder {
                order,
                profile: profile.map(CustomerSummary::from),
            })
            .collect())
    }

    /// Paginated order list for the back-office. `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: &OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let status = parse_order_status(status)?;
            query = query.filter(order::Column::Status.eq(status.to_string()));
        }
        if let Some(payment) = filter.payment_status.as_deref().filter(|s| !s.is_empty()) {
            let payment = parse_payment_status(payment)?;
            query = query.filter(order::Column::PaymentStatus.eq(payment.to_string()));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// The caller's own order with its lines; other users' orders are not found
    #[instrument(skip(self))]
    pub async fn get_for_user(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|(item, product)| OrderLineDetail {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                product: product.map(|p| ProductRef {
                    id: p.id,
                    name: p.name,
                }),
            })
            .collect();

        Ok(OrderDetail { order, items })
    }

    /// Customer-submitted UPI reference and payment screenshot
    #[instrument(skip(self, upi_transaction_id, payment_screenshot_url))]
    pub async fn update_payment_proof(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        upi_transaction_id: Option<String>,
        payment_screenshot_url: Option<String>,
    ) -> Result<(), ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Not found".to_string()))?;

        let mut active: order::ActiveModel = order.into();
        if let Some(txn_id) = upi_transaction_id {
            active.upi_transaction_id = Set(Some(txn_id));
        }
        if let Some(url) = payment_screenshot_url {
            active.payment_screenshot_url = Set(Some(url));
        }
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        info!("payment proof recorded");
        Ok(())
    }

    /// Matches a gateway notification to a local order by the stored gateway
    /// order id or by any of the supplied order numbers
    pub async fn find_for_gateway(
        &self,
        gateway_order_id: Option<&str>,
        order_numbers: &[String],
    ) -> Result<Option<order::Model>, ServiceError> {
        let mut condition = Condition::any();
        if let Some(gateway_id) = gateway_order_id {
            condition = condition.add(order::Column::GatewayOrderId.eq(gateway_id));
        }
        for number in order_numbers {
            condition = condition.add(order::Column::OrderNumber.eq(number.as_str()));
        }
        if condition.is_empty() {
            return Ok(None);
        }
        Ok(order::Entity::find().filter(condition).one(&*self.db).await?)
    }

    /// Records the gateway order created for this order
    pub async fn attach_gateway_order(
        &self,
        order_id: Uuid,
        gateway_order_id: &str,
    ) -> Result<(), ServiceError> {
        order::Entity::update_many()
            .col_expr(order::Column::GatewayOrderId, Expr::value(gateway_order_id))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Fails a pending payment reported by the gateway
    pub async fn record_gateway_failure(&self, order_id: Uuid) -> Result<StatusChange, ServiceError> {
        if self.fail_pending(order_id, Utc::now()).await? {
            self.event_sender
                .publish(Event::PaymentFailed { order_id })
                .await;
            Ok(StatusChange::Applied)
        } else {
            Ok(StatusChange::Unchanged)
        }
    }

    /// Admin fulfilment transition (processing, shipped, delivered...)
    #[instrument(skip(self, update), fields(order_id = %order_id, status = %update.status))]
    pub async fn update_fulfilment(
        &self,
        order_id: Uuid,
        update: FulfilmentUpdate,
    ) -> Result<order::Model, ServiceError> {
        let next = parse_order_status(&update.status)?;
        let current = self.find_order(order_id).await?;
        ensure_order_transition(&current.status, next)?;

        let payment = parse_payment_status(&current.payment_status)?;
        if matches!(next, OrderStatus::Cancelled) && payment == PaymentStatus::Pending {
            self.cancel(order_id).await?;
            return self.find_order(order_id).await;
        }

        let now = Utc::now();
        let mut query = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(next.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        let tracking = update
            .tracking_number
            .clone()
            .filter(|t| !t.trim().is_empty());
        if let Some(tracking) = &tracking {
            query = query.col_expr(order::Column::TrackingNumber, Expr::value(tracking.as_str()));
        }
        let result = query
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.status.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order was updated by another request".to_string(),
            ));
        }

        info!(from = %current.status, to = %next, "order status updated");
        if next == OrderStatus::Shipped {
            self.event_sender
                .publish(Event::OrderShipped {
                    order_id,
                    tracking_number: tracking,
                    estimated_delivery: update.estimated_delivery,
                })
                .await;
        }

        self.find_order(order_id).await
    }
}
