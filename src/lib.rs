//! Saree storefront backend
//!
//! Catalog, carts, UPI and Razorpay checkout, order fulfilment and the admin
//! back-office, served over a JSON HTTP API. Customer notifications go out
//! over WhatsApp and e-mail from a background event consumer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod storage;
pub mod tracing;

use axum::{extract::FromRef, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    errors::ServiceError,
    events::{Event, EventSender, NotificationDispatcher},
    notifications::{EmailSender, ResendClient, WhatsAppClient, WhatsAppSender},
    services::cart_tracking::{
        CartSessionStore, CartTracker, InMemoryCartSessionStore, RedisCartSessionStore,
        TrackerSettings,
    },
};

/// Outbound messaging providers; swapped for mocks in tests
#[derive(Clone)]
pub struct Providers {
    pub whatsapp: Arc<dyn WhatsAppSender>,
    pub email: Arc<dyn EmailSender>,
}

impl Providers {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let timeout = cfg.http_timeout();
        Ok(Self {
            whatsapp: Arc::new(WhatsAppClient::new(&cfg.whatsapp, timeout)?),
            email: Arc::new(ResendClient::new(&cfg.email, &cfg.store, timeout)?),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub cart_tracker: Arc<CartTracker>,
    pub whatsapp: Arc<dyn WhatsAppSender>,
    pub email: Arc<dyn EmailSender>,
    pub redis: Option<Arc<redis::Client>>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Wires services together. The returned receiver must be handed to
    /// [`events::process_events`] or published events pile up unread.
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        redis: Option<Arc<redis::Client>>,
        providers: Providers,
    ) -> Result<(Self, mpsc::Receiver<Event>), ServiceError> {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let event_sender = EventSender::new(event_tx);

        let services = handlers::AppServices::new(
            db.clone(),
            config.clone(),
            event_sender.clone(),
            redis.clone(),
        )?;
        let auth = Arc::new(AuthService::new(AuthConfig::from(&*config), db.clone()));

        let tracking = &config.cart_tracking;
        let session_store: Arc<dyn CartSessionStore> =
            match (tracking.backend.eq_ignore_ascii_case("redis"), &redis) {
                (true, Some(client)) => Arc::new(RedisCartSessionStore::new(
                    client.clone(),
                    tracking.redis_namespace.clone(),
                    chrono::Duration::hours(tracking.eviction_hours),
                )),
                _ => Arc::new(InMemoryCartSessionStore::new()),
            };
        let cart_tracker = Arc::new(CartTracker::new(
            session_store,
            providers.whatsapp.clone(),
            TrackerSettings::from_config(tracking, &config.store.site_url),
        ));

        let state = Self {
            db,
            config,
            event_sender,
            services,
            auth,
            cart_tracker,
            whatsapp: providers.whatsapp,
            email: providers.email,
            redis,
        };
        Ok((state, event_rx))
    }

    pub fn notification_dispatcher(&self) -> Arc<NotificationDispatcher> {
        Arc::new(NotificationDispatcher::new(
            self.db.clone(),
            self.config.clone(),
            self.whatsapp.clone(),
            self.email.clone(),
        ))
    }
}

/// Every API route, unlayered
pub fn api_routes(config: &AppConfig) -> Router<AppState> {
    use handlers::*;

    Router::new()
        .nest("/api/products", products::product_routes())
        .nest("/api/cart", cart::cart_routes())
        .nest("/api/wishlist", wishlist::wishlist_routes())
        .nest("/api/addresses", addresses::address_routes())
        .nest("/api/checkout", checkout::checkout_routes())
        .nest("/api/newsletter", newsletter::newsletter_routes())
        .nest("/api/orders", orders::order_routes())
        .nest(
            "/api/upload",
            uploads::upload_routes(config.storage.max_upload_bytes),
        )
        .nest("/api/admin", admin::admin_routes())
        .nest("/api/cron", cron::cron_routes())
        .nest("/api/whatsapp", whatsapp::whatsapp_routes())
        .nest("/api/payments", payments::payment_routes())
        .nest("/api/email", email::email_routes())
        .nest("/health", health::health_routes())
}

/// Routes plus the request-id and trace layers every deployment needs
pub fn app_router(state: AppState) -> Router {
    api_routes(&state.config)
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
