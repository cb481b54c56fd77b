use super::common::{Ack, JsonBody};
use crate::{
    errors::ServiceError,
    events::invoice_lines,
    handlers::AppState,
    notifications::{
        templates::{
            order_confirmation_email, payment_verified_email, MailBranding, OrderConfirmationMail,
        },
        EmailDelivery, OutgoingEmail,
    },
};
use axum::{extract::State, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionalEmailRequest {
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub amount: Option<Decimal>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

struct Recipient {
    order_number: String,
    amount: Decimal,
    email: String,
}

impl TransactionalEmailRequest {
    fn recipient(&self) -> Result<Recipient, ServiceError> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_owned);
        match (
            non_empty(&self.order_number),
            self.amount,
            non_empty(&self.customer_email),
        ) {
            (Some(order_number), Some(amount), Some(email)) => Ok(Recipient {
                order_number,
                amount,
                email,
            }),
            _ => Err(ServiceError::BadRequest(
                "Missing required fields".to_string(),
            )),
        }
    }
}

/// Mail failures are logged, never surfaced to the caller
async fn deliver(state: &AppState, email: OutgoingEmail, kind: &str) {
    let to = email.to.clone();
    match state.email.send(email).await {
        Ok(EmailDelivery::Sent(id)) => info!(%to, ?id, kind, "email sent"),
        Ok(EmailDelivery::Skipped) => info!(%to, kind, "email provider not configured, skipped"),
        Err(e) => warn!(%to, kind, error = %e, "email delivery failed"),
    }
}

/// Send the order confirmation mail
#[utoipa::path(
    post,
    path = "/api/email/order-confirmation",
    responses(
        (status = 200, description = "Accepted", body = Ack),
        (status = 400, description = "Missing required fields", body = crate::errors::ErrorResponse)
    ),
    tag = "Integrations"
)]
pub async fn order_confirmation(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<TransactionalEmailRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let recipient = request.recipient()?;

    let lines = match request.order_id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) {
        Some(order_id) => invoice_lines(&state.db, order_id).await.unwrap_or_else(|e| {
            warn!(%order_id, error = %e, "could not load invoice lines");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let store = &state.config.store;
    let brand = MailBranding {
        store_name: &store.name,
        support_email: &store.support_email,
        site_url: &store.site_url,
    };
    let order_id = request.order_id.as_deref().unwrap_or(&recipient.order_number);
    let mail = order_confirmation_email(
        &OrderConfirmationMail {
            to: &recipient.email,
            customer_name: request.customer_name.as_deref(),
            order_id,
            order_number: &recipient.order_number,
            amount: recipient.amount,
            lines: &lines,
        },
        &brand,
    );
    deliver(&state, mail, "order_confirmation").await;
    Ok(Json(Ack::ok()))
}

/// Send the payment received mail
#[utoipa::path(
    post,
    path = "/api/email/payment-verified",
    responses(
        (status = 200, description = "Accepted", body = Ack),
        (status = 400, description = "Missing required fields", body = crate::errors::ErrorResponse)
    ),
    tag = "Integrations"
)]
pub async fn payment_verified(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<TransactionalEmailRequest>,
) -> Result<Json<Ack>, ServiceError> {
    let recipient = request.recipient()?;
    let store = &state.config.store;
    let mail = payment_verified_email(
        &recipient.email,
        request.customer_name.as_deref(),
        &recipient.order_number,
        recipient.amount,
        &MailBranding {
            store_name: &store.name,
            support_email: &store.support_email,
            site_url: &store.site_url,
        },
    );
    deliver(&state, mail, "payment_verified").await;
    Ok(Json(Ack::ok()))
}

pub fn email_routes() -> Router<AppState> {
    Router::new()
        .route("/order-confirmation", post(order_confirmation))
        .route("/payment-verified", post(payment_verified))
}
