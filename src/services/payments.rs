//! Razorpay integration: hosted checkout orders, checkout signature checks and
//! webhook handling wired to local orders.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    config::PaymentsConfig,
    errors::ServiceError,
    services::{
        order_status::PaymentStatus,
        orders::{OrderService, PaymentConfirmation, StatusChange},
    },
};

type HmacSha256 = Hmac<Sha256>;

pub const GATEWAY_RAZORPAY: &str = "razorpay";
const PAYMENT_METHOD_COD: &str = "cod";
const MISSING_FIELDS: &str = "Missing required fields";
const EVENT_LOG_PRUNE_AT: usize = 10_000;

/// Hex-encoded HMAC-SHA256 of `message`
pub fn sign_hex(secret: &str, message: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid HMAC key: {}", e)))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Checkout handler signature: HMAC of `"{order_id}|{payment_id}"` with the key secret
pub fn verify_checkout_signature(
    key_secret: &str,
    gateway_order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    sign_hex(key_secret, format!("{}|{}", gateway_order_id, payment_id).as_bytes())
        .map(|expected| constant_time_eq(&expected, signature.trim()))
        .unwrap_or(false)
}

/// Webhook signature: HMAC of the raw request body with the webhook secret
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    sign_hex(secret, body)
        .map(|expected| constant_time_eq(&expected, signature.trim()))
        .unwrap_or(false)
}

/// Rupees to paise, rounded to the nearest paisa
pub fn to_paise(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::BadRequest("Amount out of range".to_string()))
}

#[derive(Debug, Serialize)]
struct CreateGatewayOrder<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
    notes: GatewayNotes<'a>,
}

#[derive(Debug, Serialize)]
struct GatewayNotes<'a> {
    order_number: &'a str,
}

/// Order created on the gateway
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Paise
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
}

/// Razorpay REST client
#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: Option<String>,
    key_secret: Option<String>,
}

impl RazorpayClient {
    pub fn new(config: &PaymentsConfig, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.razorpay_api_base_url.trim_end_matches('/').to_string(),
            key_id: config.razorpay_key_id.clone().filter(|v| !v.trim().is_empty()),
            key_secret: config
                .razorpay_key_secret
                .clone()
                .filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn key_id(&self) -> &str {
        self.key_id.as_deref().unwrap_or_default()
    }

    pub fn key_secret(&self) -> Option<&str> {
        self.key_secret.as_deref()
    }

    #[instrument(skip(self))]
    pub async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let (Some(key_id), Some(key_secret)) = (&self.key_id, &self.key_secret) else {
            return Err(ServiceError::NotConfigured("Razorpay".to_string()));
        };
        let credentials = STANDARD.encode(format!("{}:{}", key_id, key_secret));

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .header(AUTHORIZATION, format!("Basic {}", credentials))
            .json(&CreateGatewayOrder {
                amount: to_paise(amount)?,
                currency,
                receipt,
                payment_capture: 1,
                notes: GatewayNotes {
                    order_number: receipt,
                },
            })
            .send()
            .await
            .map_err(|e| ServiceError::upstream("Failed to reach Razorpay", Some(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Razorpay rejected order creation");
            return Err(ServiceError::upstream(
                "Failed to create payment order",
                Some(body),
            ));
        }

        let order: GatewayOrder = response
            .json()
            .await
            .map_err(|e| ServiceError::upstream("Invalid Razorpay response", Some(e.to_string())))?;
        info!(gateway_order_id = %order.id, amount = order.amount, "Razorpay order created");
        Ok(order)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsPublicConfig {
    pub razorpay_key_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    /// Local order id or order number, used as the gateway receipt
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: Option<Decimal>,
    pub gateway: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub order_details: Option<OrderDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPaymentData {
    pub payment_id: String,
    /// Gateway order id
    pub order_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub gateway: Option<String>,
    pub payment_data: Option<CheckoutPaymentData>,
    /// Local order id or order number
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<EntityWrapper<PaymentEntity>>,
    order: Option<EntityWrapper<GatewayOrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    /// Paise
    #[serde(default)]
    amount: Option<i64>,
    /// Razorpay sends `[]` when there are no notes
    #[serde(default)]
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderEntity {
    id: String,
    receipt: Option<String>,
    #[serde(default)]
    amount_paid: Option<i64>,
    #[serde(default)]
    notes: serde_json::Value,
}

fn note_order_number(notes: &serde_json::Value) -> Option<String> {
    notes
        .get("order_number")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// What a webhook delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Same event id seen before
    Duplicate,
    /// Unhandled event type or no matching order
    Ignored,
}

/// Remembers which webhook event ids were applied
#[async_trait]
pub trait WebhookEventLog: Send + Sync {
    /// False when the id was already claimed
    async fn claim(&self, event_id: &str) -> bool;
    /// Drops a claim whose processing failed so the gateway's retry is applied
    async fn release(&self, event_id: &str);
}

/// Process-local event log; claims expire after `ttl`
pub struct InMemoryWebhookEventLog {
    seen: DashMap<String, Instant>,
    ttl: Duration,
}

impl InMemoryWebhookEventLog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }
}

#[async_trait]
impl WebhookEventLog for InMemoryWebhookEventLog {
    async fn claim(&self, event_id: &str) -> bool {
        let now = Instant::now();
        if self.seen.len() >= EVENT_LOG_PRUNE_AT {
            self.seen.retain(|_, at| now.duration_since(*at) < self.ttl);
        }
        match self.seen.entry(event_id.to_string()) {
            Entry::Occupied(mut entry) if now.duration_since(*entry.get()) >= self.ttl => {
                entry.insert(now);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    async fn release(&self, event_id: &str) {
        self.seen.remove(event_id);
    }
}

/// Event log shared by every instance. Redis outages fail open; the
/// conditional status writes keep a replayed event harmless.
pub struct RedisWebhookEventLog {
    client: Arc<redis::Client>,
    ttl_secs: u64,
}

impl RedisWebhookEventLog {
    pub fn new(client: Arc<redis::Client>, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    fn key(event_id: &str) -> String {
        format!("razorpay:webhook:{}", event_id)
    }
}

#[async_trait]
impl WebhookEventLog for RedisWebhookEventLog {
    async fn claim(&self, event_id: &str) -> bool {
        let result = match self.client.get_async_connection().await {
            Ok(mut conn) => {
                redis::cmd("SET")
                    .arg(Self::key(event_id))
                    .arg("1")
                    .arg("NX")
                    .arg("EX")
                    .arg(self.ttl_secs)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => reply.is_some(),
            Err(e) => {
                warn!(error = %e, "webhook de-duplication unavailable");
                true
            }
        }
    }

    async fn release(&self, event_id: &str) {
        let result = match self.client.get_async_connection().await {
            Ok(mut conn) => {
                redis::cmd("DEL")
                    .arg(Self::key(event_id))
                    .query_async::<_, ()>(&mut conn)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(error = %e, event_id, "failed to release webhook claim; retries will be skipped");
        }
    }
}

/// Gateway checkout flow and webhook reconciliation
#[derive(Clone)]
pub struct PaymentService {
    razorpay: RazorpayClient,
    orders: Arc<OrderService>,
    event_log: Arc<dyn WebhookEventLog>,
    webhook_secret: Option<String>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        razorpay: RazorpayClient,
        orders: Arc<OrderService>,
        redis: Option<Arc<redis::Client>>,
        config: &PaymentsConfig,
        currency: impl Into<String>,
    ) -> Self {
        let event_log: Arc<dyn WebhookEventLog> = match redis {
            Some(client) => Arc::new(RedisWebhookEventLog::new(
                client,
                config.webhook_dedupe_ttl_secs,
            )),
            None => Arc::new(InMemoryWebhookEventLog::new(Duration::from_secs(
                config.webhook_dedupe_ttl_secs,
            ))),
        };
        Self {
            razorpay,
            orders,
            event_log,
            webhook_secret: config
                .razorpay_webhook_secret
                .clone()
                .filter(|v| !v.trim().is_empty()),
            currency: currency.into(),
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn WebhookEventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn public_config(&self) -> PaymentsPublicConfig {
        PaymentsPublicConfig {
            razorpay_key_id: self.razorpay.key_id().to_string(),
        }
    }

    /// Starts a gateway payment. Cash on delivery needs no gateway round trip.
    #[instrument(skip(self, request))]
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, ServiceError> {
        let (Some(amount), Some(gateway), Some(method), Some(details)) = (
            request.amount.filter(|a| *a > Decimal::ZERO),
            request.gateway.filter(|g| !g.trim().is_empty()),
            request.payment_method,
            request.order_details,
        ) else {
            return Err(ServiceError::BadRequest(MISSING_FIELDS.to_string()));
        };

        if method.kind.eq_ignore_ascii_case(PAYMENT_METHOD_COD) {
            return Ok(CreatePaymentResponse {
                success: true,
                payment_id: Some(format!("cod_{}", Utc::now().timestamp_millis())),
                order_id: details.order_id,
                redirect_url: None,
            });
        }

        if !gateway.eq_ignore_ascii_case(GATEWAY_RAZORPAY) {
            return Err(ServiceError::BadRequest(format!(
                "Unsupported payment gateway: {}",
                gateway
            )));
        }

        // A known order is charged its stored total, never the client's figure
        let local = self.orders.find_by_reference(&details.order_id).await?;
        let (charge, receipt) = match &local {
            Some(order) => {
                if order.payment_status != PaymentStatus::Pending.to_string() {
                    return Err(ServiceError::BadRequest(
                        "Order is not awaiting payment".to_string(),
                    ));
                }
                if amount != order.total_amount {
                    warn!(
                        order_id = %order.id,
                        requested = %amount,
                        total = %order.total_amount,
                        "client amount differs from order total"
                    );
                }
                (order.total_amount, order.order_number.clone())
            }
            None => (amount, details.order_id.clone()),
        };

        let gateway_order = self
            .razorpay
            .create_order(charge, &self.currency, &receipt)
            .await?;

        if let Some(order) = &local {
            self.orders
                .attach_gateway_order(order.id, &gateway_order.id)
                .await?;
        }

        Ok(CreatePaymentResponse {
            success: true,
            payment_id: None,
            redirect_url: Some(format!(
                "/payment/razorpay?orderId={}&amount={}",
                gateway_order.id,
                charge.normalize()
            )),
            order_id: gateway_order.id,
        })
    }

    /// Checks the checkout signature and confirms the matching local order
    #[instrument(skip(self, request))]
    pub async fn verify_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        let (Some(_gateway), Some(data), Some(order_ref)) =
            (request.gateway, request.payment_data, request.order_id)
        else {
            return Err(ServiceError::BadRequest(MISSING_FIELDS.to_string()));
        };
        let Some(secret) = self.razorpay.key_secret() else {
            return Err(ServiceError::NotConfigured("Razorpay".to_string()));
        };

        if !verify_checkout_signature(secret, &data.order_id, &data.payment_id, &data.signature) {
            warn!(gateway_order_id = %data.order_id, "checkout signature mismatch");
            return Err(ServiceError::BadRequest(
                "Payment verification failed".to_string(),
            ));
        }

        match self.orders.find_by_reference(&order_ref).await? {
            Some(order) if order.gateway_order_id.as_deref() == Some(data.order_id.as_str()) => {
                self.orders
                    .confirm_payment(
                        order.id,
                        PaymentConfirmation {
                            payment_id: Some(data.payment_id),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            Some(order) => {
                warn!(
                    order_id = %order.id,
                    gateway_order_id = %data.order_id,
                    "payment belongs to a different gateway order"
                );
                return Err(ServiceError::BadRequest(
                    "Payment does not match order".to_string(),
                ));
            }
            None => warn!(order_ref = %order_ref, "verified payment has no local order"),
        }

        Ok(VerifyPaymentResponse {
            success: true,
            verified: true,
        })
    }

    /// Verifies and applies a Razorpay webhook delivery
    #[instrument(skip(self, body, signature), fields(bytes = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let (Some(signature), Some(secret)) = (signature, self.webhook_secret.as_deref()) else {
            return Err(ServiceError::BadRequest(
                "Missing signature or webhook secret".to_string(),
            ));
        };
        if !verify_webhook_signature(secret, body, signature) {
            warn!("Razorpay webhook signature verification failed");
            return Err(ServiceError::BadRequest("Invalid signature".to_string()));
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|_| ServiceError::BadRequest("Invalid payload".to_string()))?;

        if let Some(event_id) = event_id {
            if !self.event_log.claim(event_id).await {
                info!(event_id, "Razorpay webhook already processed");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let result = self.apply_event(envelope).await;
        if let (Err(e), Some(event_id)) = (&result, event_id) {
            warn!(event_id, error = %e, "webhook processing failed, releasing event id");
            self.event_log.release(event_id).await;
        }
        result
    }

    async fn apply_event(&self, envelope: WebhookEnvelope) -> Result<WebhookOutcome, ServiceError> {
        match envelope.event.as_str() {
            "payment.captured" => {
                let Some(payment) = envelope.payload.payment.map(|p| p.entity) else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let numbers: Vec<String> = note_order_number(&payment.notes).into_iter().collect();
                self.settle(
                    payment.order_id.as_deref(),
                    &numbers,
                    Some(payment.id),
                    payment.amount,
                )
                .await
            }
            "order.paid" => {
                let Some(order) = envelope.payload.order.map(|o| o.entity) else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let numbers: Vec<String> = order
                    .receipt
                    .into_iter()
                    .chain(note_order_number(&order.notes))
                    .collect();
                let payment = envelope.payload.payment.map(|p| p.entity);
                let paid = payment
                    .as_ref()
                    .and_then(|p| p.amount)
                    .or(order.amount_paid);
                self.settle(
                    Some(order.id.as_str()),
                    &numbers,
                    payment.map(|p| p.id),
                    paid,
                )
                .await
            }
            "payment.failed" => {
                let Some(payment) = envelope.payload.payment.map(|p| p.entity) else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let numbers: Vec<String> = note_order_number(&payment.notes).into_iter().collect();
                match self
                    .orders
                    .find_for_gateway(payment.order_id.as_deref(), &numbers)
                    .await?
                {
                    Some(order) => {
                        self.orders.record_gateway_failure(order.id).await?;
                        Ok(WebhookOutcome::Processed)
                    }
                    None => {
                        warn!(payment_id = %payment.id, "failed payment has no local order");
                        Ok(WebhookOutcome::Ignored)
                    }
                }
            }
            other => {
                info!(event = other, "Unhandled Razorpay webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn settle(
        &self,
        gateway_order_id: Option<&str>,
        order_numbers: &[String],
        payment_id: Option<String>,
        paid_paise: Option<i64>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let Some(order) = self
            .orders
            .find_for_gateway(gateway_order_id, order_numbers)
            .await?
        else {
            warn!(?gateway_order_id, "captured payment has no local order");
            return Ok(WebhookOutcome::Ignored);
        };

        let due = to_paise(order.total_amount)?;
        if !paid_paise.is_some_and(|paid| paid >= due) {
            warn!(
                order_id = %order.id,
                ?paid_paise,
                due,
                "captured amount does not cover the order"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        // A webhook for an already cancelled order is logged, not retried
        match self
            .orders
            .confirm_payment(
                order.id,
                PaymentConfirmation {
                    payment_id,
                    ..Default::default()
                },
            )
            .await
        {
            Ok(StatusChange::Applied) | Ok(StatusChange::Unchanged) => Ok(WebhookOutcome::Processed),
            Err(ServiceError::InvalidStatus(reason)) => {
                warn!(order_id = %order.id, %reason, "captured payment for a closed order");
                Ok(WebhookOutcome::Processed)
            }
            Err(e) => Err(e),
        }
    }
}
