use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{entities::address, errors::ServiceError};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    /// Present when editing an existing address
    pub id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 10, max = 15))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(equal = 6))]
    pub pincode: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Default address first
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Creates or edits an address. Marking it default clears the flag on the
    /// user's other addresses in the same transaction.
    #[instrument(skip(self, input))]
    pub async fn save(&self, user_id: Uuid, input: AddressInput) -> Result<address::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let saved = match input.id {
            Some(id) => {
                let existing = address::Entity::find_by_id(id)
                    .filter(address::Column::UserId.eq(user_id))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;
                let mut active: address::ActiveModel = existing.into();
                active.name = Set(input.name);
                active.full_name = Set(input.full_name);
                active.phone = Set(input.phone);
                active.address_line1 = Set(input.address_line1);
                active.address_line2 = Set(input.address_line2);
                active.city = Set(input.city);
                active.state = Set(input.state);
                active.pincode = Set(input.pincode);
                active.is_default = Set(input.is_default);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                address::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    name: Set(input.name),
                    full_name: Set(input.full_name),
                    phone: Set(input.phone),
                    address_line1: Set(input.address_line1),
                    address_line2: Set(input.address_line2),
                    city: Set(input.city),
                    state: Set(input.state),
                    pincode: Set(input.pincode),
                    is_default: Set(input.is_default),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        if saved.is_default {
            address::Entity::update_many()
                .col_expr(address::Column::IsDefault, Expr::value(false))
                .filter(address::Column::UserId.eq(user_id))
                .filter(address::Column::Id.ne(saved.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        info!(address_id = %saved.id, is_default = saved.is_default, "address saved");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let result = address::Entity::delete_many()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Address not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, is_default: bool) -> AddressInput {
        AddressInput {
            id: None,
            name: name.into(),
            full_name: "Priya Sharma".into(),
            phone: "9876543210".into(),
            address_line1: "12 MG Road".into(),
            address_line2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: "560001".into(),
            is_default,
        }
    }

    #[tokio::test]
    async fn only_one_default_address() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("addr.sqlite").display());
        let db = crate::db::establish_connection(&url).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let service = AddressService::new(Arc::new(db));
        let user = Uuid::new_v4();

        let home = service.save(user, input("Home", true)).await.unwrap();
        let office = service.save(user, input("Office", true)).await.unwrap();

        let list = service.list(user).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, office.id);
        assert!(list[0].is_default);
        assert!(!list[1].is_default);

        let mut edit = input("Home", true);
        edit.id = Some(home.id);
        service.save(user, edit).await.unwrap();
        let list = service.list(user).await.unwrap();
        assert_eq!(list[0].id, home.id);
        assert_eq!(list.iter().filter(|a| a.is_default).count(), 1);

        assert!(matches!(
            service.delete(Uuid::new_v4(), home.id).await,
            Err(ServiceError::NotFound(_))
        ));
        service.delete(user, home.id).await.unwrap();
    }

    #[test]
    fn pincode_must_have_six_digits() {
        let mut bad = input("Home", false);
        bad.pincode = "5600".into();
        assert!(bad.validate().is_err());
    }
}
