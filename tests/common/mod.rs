#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use saree_storefront::{
    config::AppConfig,
    db,
    entities::{
        product,
        profile::{self, ROLE_ADMIN, ROLE_CUSTOMER},
    },
    events,
    notifications::{
        EmailDelivery, EmailSender, NotificationError, OutgoingEmail, TemplateMessage,
        WhatsAppSender,
    },
    AppState, Providers,
};

pub const JWT_SECRET: &str = "k7Gq2vNw9xRt4LmZp8YcHs3BfJd6UeQa1WoTiKnXgVbRyMzPl5CuEhSjDk0AqFwN8";
pub const CRON_SECRET: &str = "cron-test-secret";

/// WhatsApp sender that records instead of calling Meta
#[derive(Default)]
pub struct RecordingWhatsApp {
    pub texts: Mutex<Vec<(String, String)>>,
    pub templates: Mutex<Vec<(String, TemplateMessage)>>,
}

#[async_trait]
impl WhatsAppSender for RecordingWhatsApp {
    async fn send_text(&self, to: &str, body: &str) -> Result<Option<String>, NotificationError> {
        self.texts
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(Some("wamid.test".to_string()))
    }

    async fn send_template(
        &self,
        to: &str,
        template: TemplateMessage,
    ) -> Result<Option<String>, NotificationError> {
        self.templates
            .lock()
            .unwrap()
            .push((to.to_string(), template));
        Ok(Some("wamid.template".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, email: OutgoingEmail) -> Result<EmailDelivery, NotificationError> {
        self.sent.lock().unwrap().push(email);
        Ok(EmailDelivery::Sent(Some("email-test".to_string())))
    }
}

/// Application wired to a throwaway SQLite file and recording providers
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub whatsapp: Arc<RecordingWhatsApp>,
    pub email: Arc<RecordingEmail>,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.cron_secret = Some(CRON_SECRET.to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let whatsapp = Arc::new(RecordingWhatsApp::default());
        let email = Arc::new(RecordingEmail::default());
        let providers = Providers {
            whatsapp: whatsapp.clone(),
            email: email.clone(),
        };

        let (state, event_rx) = AppState::new(Arc::new(cfg), Arc::new(pool), None, providers)
            .expect("app state");
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            state.notification_dispatcher(),
        ));

        Self {
            router: saree_storefront::app_router(state.clone()),
            state,
            whatsapp,
            email,
            _event_task: event_task,
            _dir: dir,
        }
    }

    async fn create_profile(&self, role: &str, name: &str) -> (Uuid, String) {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let email = format!("{}@example.in", id.simple());
        profile::ActiveModel {
            id: Set(id),
            full_name: Set(Some(name.to_string())),
            email: Set(Some(email.clone())),
            phone: Set(Some("9876543210".to_string())),
            role: Set(role.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert profile");

        let token = self
            .state
            .auth
            .issue_token(id, Some(email), chrono::Duration::hours(1))
            .expect("issue token");
        (id, token)
    }

    /// Signed-in customer with a profile row
    pub async fn customer(&self) -> (Uuid, String) {
        self.create_profile(ROLE_CUSTOMER, "Priya Sharma").await
    }

    pub async fn admin(&self) -> (Uuid, String) {
        self.create_profile(ROLE_ADMIN, "Store Admin").await
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: Option<i32>) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(format!("{} for tests", name))),
            price: Set(price),
            original_price: Set(None),
            category: Set(Some("silk".to_string())),
            subcategory: Set(None),
            fabric: Set(Some("Silk".to_string())),
            color: Set(Some("Red".to_string())),
            stock_quantity: Set(stock),
            images: Set(json!(["/images/test.jpg"])),
            featured: Set(false),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert product")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// Raw body request, for signed webhooks
    pub async fn post_raw(&self, uri: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// multipart/form-data POST; each part is (name, content type, bytes)
    pub async fn post_multipart(
        &self,
        uri: &str,
        token: Option<&str>,
        parts: &[(&str, &str, &[u8])],
    ) -> Response {
        const BOUNDARY: &str = "storefront-test-boundary";
        let mut body = Vec::new();
        for (name, content_type, bytes) in parts {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}.bin\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, name, name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let mut builder = Request::builder().method(Method::POST).uri(uri).header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// Places a UPI order for `token`'s user; returns the order id and number
    pub async fn place_upi_order(
        &self,
        token: &str,
        product: &product::Model,
        quantity: i32,
    ) -> (Uuid, String) {
        let order_number = format!("SS-{}", Uuid::new_v4().simple());
        let response = self
            .request(
                Method::POST,
                "/api/orders/create-upi",
                Some(json!({
                    "orderNumber": order_number,
                    "amount": "0",
                    "shippingAddress": {
                        "fullName": "Priya Sharma",
                        "phone": "9876543210",
                        "email": "priya@example.in",
                        "city": "Chennai",
                        "pincode": "600001"
                    },
                    "items": [{
                        "product_id": product.id,
                        "quantity": quantity,
                        "price": product.price
                    }]
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), 200, "create-upi should succeed");
        let body = response_json(response).await;
        let order_id = body["orderId"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("orderId in response");
        (order_id, order_number)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Polls until background event handling has produced `expected` items
pub async fn wait_for<F>(mut observe: F, expected: usize) -> usize
where
    F: FnMut() -> usize,
{
    for _ in 0..50 {
        let seen = observe();
        if seen >= expected {
            return seen;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    observe()
}
