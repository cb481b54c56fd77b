use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    config::StoreConfig,
    entities::store_settings::{self, MAIN_SETTINGS_ID},
    errors::ServiceError,
};

/// Settings document served before an admin has saved one
pub fn default_settings(store: &StoreConfig) -> Value {
    json!({
        "storeName": store.name,
        "storeEmail": store.support_email,
        "storePhone": store.phone,
        "whatsappNumber": store.phone,
        "currency": store.currency,
        "taxRate": (store.tax_rate * rust_decimal::Decimal::ONE_HUNDRED).normalize().to_string(),
        "shippingFee": store.shipping_fee.normalize().to_string(),
        "freeShippingThreshold": store.free_shipping_threshold.normalize().to_string(),
        "whatsappEnabled": true,
        "emailNotifications": true,
        "smsNotifications": false,
        "cartAbandonmentEnabled": true,
        "orderConfirmationEnabled": true,
        "shippingUpdatesEnabled": true,
    })
}

#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DatabaseConnection>,
    defaults: Value,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>, store: &StoreConfig) -> Self {
        Self {
            db,
            defaults: default_settings(store),
        }
    }

    /// The stored `main` document, or the defaults when none is stored or it
    /// cannot be read
    #[instrument(skip(self))]
    pub async fn get(&self) -> Value {
        match store_settings::Entity::find_by_id(MAIN_SETTINGS_ID.to_string())
            .one(&*self.db)
            .await
        {
            Ok(Some(row)) => row.settings_data,
            Ok(None) => self.defaults.clone(),
            Err(e) => {
                warn!(error = %e, "settings fetch failed, serving defaults");
                self.defaults.clone()
            }
        }
    }

    #[instrument(skip(self, settings))]
    pub async fn save(&self, settings: Value) -> Result<(), ServiceError> {
        if !settings.is_object() {
            return Err(ServiceError::BadRequest(
                "settings must be an object".to_string(),
            ));
        }
        let row = store_settings::ActiveModel {
            id: Set(MAIN_SETTINGS_ID.to_string()),
            settings_data: Set(settings),
            updated_at: Set(Utc::now()),
        };
        store_settings::Entity::insert(row)
            .on_conflict(
                OnConflict::column(store_settings::Column::Id)
                    .update_columns([
                        store_settings::Column::SettingsData,
                        store_settings::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        info!("store settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_store_config() {
        let settings = default_settings(&StoreConfig::default());
        assert_eq!(settings["storeName"], "Elegance Sarees");
        assert_eq!(settings["taxRate"], "18");
        assert_eq!(settings["shippingFee"], "99");
        assert_eq!(settings["freeShippingThreshold"], "999");
        assert_eq!(settings["smsNotifications"], false);
    }

    #[tokio::test]
    async fn saved_document_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("settings.sqlite").display());
        let db = crate::db::establish_connection(&url).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let service = SettingsService::new(Arc::new(db), &StoreConfig::default());

        assert_eq!(service.get().await["currency"], "INR");
        service.save(json!({"storeName": "Saree Studio"})).await.unwrap();
        service.save(json!({"storeName": "Saree House"})).await.unwrap();
        assert_eq!(service.get().await, json!({"storeName": "Saree House"}));

        assert!(service.save(json!("nope")).await.is_err());
    }
}
