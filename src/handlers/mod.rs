pub mod addresses;
pub mod admin;
pub mod cart;
pub mod checkout;
pub mod common;
pub mod cron;
pub mod email;
pub mod health;
pub mod newsletter;
pub mod orders;
pub mod payments;
pub mod products;
pub mod uploads;
pub mod whatsapp;
pub mod wishlist;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        addresses::AddressService,
        analytics::AnalyticsService,
        cart::CartService,
        catalog::CatalogService,
        newsletter::NewsletterService,
        orders::OrderService,
        payment_proofs::PaymentProofService,
        payments::{PaymentService, RazorpayClient},
        settings::SettingsService,
        wishlist::WishlistService,
    },
    storage::StorageApiClient,
};
use std::sync::Arc;

// Handler modules import AppState from here
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub wishlist: Arc<WishlistService>,
    pub addresses: Arc<AddressService>,
    pub newsletter: Arc<NewsletterService>,
    pub settings: Arc<SettingsService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub payment_proofs: Arc<PaymentProofService>,
    pub analytics: Arc<AnalyticsService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        redis_client: Option<Arc<redis::Client>>,
    ) -> Result<Self, ServiceError> {
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender,
            config.clone(),
        ));
        let razorpay = RazorpayClient::new(&config.payments, config.http_timeout())?;
        let payments = Arc::new(PaymentService::new(
            razorpay,
            orders.clone(),
            redis_client,
            &config.payments,
            config.store.currency.clone(),
        ));
        let storage = StorageApiClient::new(&config.storage, config.http_timeout())
            .map_err(ServiceError::from)?;
        let payment_proofs = Arc::new(PaymentProofService::new(
            Arc::new(storage),
            orders.clone(),
            config.storage.payment_proof_bucket.clone(),
        ));

        Ok(Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone(), &config.store)),
            cart: Arc::new(CartService::new(db_pool.clone())),
            wishlist: Arc::new(WishlistService::new(db_pool.clone())),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            newsletter: Arc::new(NewsletterService::new(db_pool.clone())),
            settings: Arc::new(SettingsService::new(db_pool.clone(), &config.store)),
            orders,
            payments,
            payment_proofs,
            analytics: Arc::new(AnalyticsService::new(db_pool)),
        })
    }
}
