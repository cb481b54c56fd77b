//! Cart state and the server-side cart mirror.
//!
//! [`CartState`] is the reducer the storefront drives on every cart change;
//! [`CartService`] persists an authenticated user's cart so it follows them
//! across devices.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart_item, product},
    errors::ServiceError,
};

/// One product in a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Mutations accepted by the cart reducer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartAction {
    /// Adds the line, or bumps the quantity of an existing line with the same id
    AddItem(CartLine),
    UpdateQuantity { id: Uuid, quantity: i32 },
    RemoveItem { id: Uuid },
    ClearCart,
    LoadCart(Vec<CartLine>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    pub items: Vec<CartLine>,
    pub total: Decimal,
    pub item_count: i64,
}

impl CartState {
    pub fn from_items(items: Vec<CartLine>) -> Self {
        let mut state = Self::default();
        state.apply(CartAction::LoadCart(items));
        state
    }

    pub fn apply(&mut self, action: CartAction) {
        match action {
            CartAction::AddItem(line) => {
                let added = line.quantity.max(1);
                match self.items.iter_mut().find(|existing| existing.id == line.id) {
                    Some(existing) => existing.quantity = existing.quantity.saturating_add(added),
                    None => self.items.push(CartLine {
                        quantity: added,
                        ..line
                    }),
                }
            }
            CartAction::UpdateQuantity { id, quantity } => {
                if quantity <= 0 {
                    self.items.retain(|line| line.id != id);
                } else if let Some(line) = self.items.iter_mut().find(|line| line.id == id) {
                    line.quantity = quantity;
                }
            }
            CartAction::RemoveItem { id } => self.items.retain(|line| line.id != id),
            CartAction::ClearCart => self.items.clear(),
            CartAction::LoadCart(items) => {
                self.items = items.into_iter().filter(|line| line.quantity > 0).collect();
            }
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        self.total = self
            .items
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum();
        self.item_count = self.items.iter().map(|line| i64::from(line.quantity)).sum();
    }
}

/// Merges a guest cart into the user's cart on login.
///
/// The user's lines keep their order; quantities of shared products are summed
/// and guest-only products are appended.
pub fn merge_carts(guest: &[CartLine], user: &[CartLine]) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = user.to_vec();
    for guest_line in guest {
        match merged.iter_mut().find(|line| line.id == guest_line.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(guest_line.quantity),
            None => merged.push(guest_line.clone()),
        }
    }
    merged
}

/// Line of the persisted cart joined with its catalog product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCartLine {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    pub quantity: i32,
}

/// Requested quantity for a product in a cart sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartQuantity {
    pub id: Uuid,
    pub quantity: i32,
}

const UNKNOWN_PRODUCT_NAME: &str = "Product";

/// Server-side cart mirror for authenticated users
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<StoredCartLine>, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item, product)| StoredCartLine {
                id: item.product_id,
                name: product
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
                price: product.as_ref().map(|p| p.price).unwrap_or_default(),
                image: product
                    .as_ref()
                    .map(product::Model::primary_image)
                    .unwrap_or_else(|| product::PLACEHOLDER_IMAGE.to_string()),
                quantity: item.quantity,
            })
            .collect())
    }

    /// Replaces the user's stored cart: present products are upserted and
    /// everything else is removed. Duplicate ids keep the last quantity.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn replace_cart(
        &self,
        user_id: Uuid,
        items: &[CartQuantity],
    ) -> Result<(), ServiceError> {
        if items.iter().any(|item| item.quantity <= 0) {
            return Err(ServiceError::BadRequest("Invalid payload".to_string()));
        }

        let mut wanted: HashMap<Uuid, i32> = HashMap::with_capacity(items.len());
        for item in items {
            wanted.insert(item.id, item.quantity);
        }
        let keep: Vec<Uuid> = wanted.keys().copied().collect();

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let mut delete = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id));
        if !keep.is_empty() {
            delete = delete.filter(cart_item::Column::ProductId.is_not_in(keep));
        }
        let removed = delete.exec(&txn).await?.rows_affected;

        for (product_id, quantity) in &wanted {
            let row = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(*product_id),
                quantity: Set(*quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            cart_item::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([cart_item::Column::UserId, cart_item::Column::ProductId])
                        .update_columns([cart_item::Column::Quantity, cart_item::Column::UpdatedAt])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        info!(%user_id, kept = wanted.len(), removed, "cart synced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(id: Uuid, price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            id,
            name: format!("Saree {}", &id.to_string()[..4]),
            price,
            image: String::new(),
            quantity,
        }
    }

    #[test]
    fn adding_same_product_increments_quantity() {
        let a = Uuid::new_v4();
        let mut cart = CartState::default();
        cart.apply(CartAction::AddItem(line(a, dec!(500), 1)));
        cart.apply(CartAction::AddItem(line(a, dec!(500), 1)));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.total, dec!(1000));
        assert_eq!(cart.item_count, 2);
    }

    #[test]
    fn add_without_quantity_defaults_to_one() {
        let a = Uuid::new_v4();
        let mut cart = CartState::default();
        cart.apply(CartAction::AddItem(line(a, dec!(250), 0)));
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[test]
    fn updating_to_zero_removes_line() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut cart = CartState::from_items(vec![line(a, dec!(500), 2), line(b, dec!(300), 1)]);
        assert_eq!(cart.total, dec!(1300));

        cart.apply(CartAction::UpdateQuantity { id: b, quantity: 0 });
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total, dec!(1000));

        cart.apply(CartAction::ClearCart);
        assert!(cart.items.is_empty());
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.total, Decimal::ZERO);
    }

    #[test]
    fn guest_cart_merges_into_user_cart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let guest = vec![line(a, dec!(500), 1)];
        let user = vec![line(a, dec!(500), 2), line(b, dec!(300), 1)];

        let merged = merge_carts(&guest, &user);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, a);
        assert_eq!(merged[0].quantity, 3);
        assert_eq!(merged[1].id, b);
        assert_eq!(merged[1].quantity, 1);
    }

    #[test]
    fn guest_only_items_are_appended() {
        let a = Uuid::new_v4();
        let c = Uuid::new_v4();
        let merged = merge_carts(&[line(c, dec!(100), 4)], &[line(a, dec!(500), 1)]);
        assert_eq!(merged.iter().map(|l| l.id).collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn actions_deserialize_from_tagged_json() {
        let id = Uuid::new_v4();
        let action: CartAction = serde_json::from_value(serde_json::json!({
            "type": "UPDATE_QUANTITY",
            "payload": {"id": id, "quantity": 3}
        }))
        .unwrap();
        assert_eq!(action, CartAction::UpdateQuantity { id, quantity: 3 });
    }

    fn arb_action(ids: Vec<Uuid>) -> impl Strategy<Value = CartAction> {
        let pick = proptest::sample::select(ids);
        prop_oneof![
            (pick.clone(), 1u32..50_000, 0i32..5).prop_map(|(id, paise, qty)| {
                CartAction::AddItem(CartLine {
                    id,
                    name: "x".into(),
                    price: Decimal::new(i64::from(paise), 2),
                    image: String::new(),
                    quantity: qty,
                })
            }),
            (pick.clone(), -2i32..6)
                .prop_map(|(id, quantity)| CartAction::UpdateQuantity { id, quantity }),
            pick.prop_map(|id| CartAction::RemoveItem { id }),
            Just(CartAction::ClearCart),
        ]
    }

    proptest! {
        #[test]
        fn total_always_matches_lines(
            actions in proptest::collection::vec(
                arb_action((0..4).map(|_| Uuid::new_v4()).collect()),
                0..40,
            )
        ) {
            let mut cart = CartState::default();
            for action in actions {
                cart.apply(action);
                let expected: Decimal = cart
                    .items
                    .iter()
                    .map(|l| l.price * Decimal::from(l.quantity))
                    .sum();
                prop_assert_eq!(cart.total, expected);
                prop_assert!(cart.items.iter().all(|l| l.quantity > 0));
                let count: i64 = cart.items.iter().map(|l| i64::from(l.quantity)).sum();
                prop_assert_eq!(cart.item_count, count);
            }
        }
    }
}
