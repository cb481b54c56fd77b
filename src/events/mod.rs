//! In-process event channel.
//!
//! Request handlers publish [`Event`]s after their database work commits; a
//! single background consumer turns them into customer notifications, so a
//! slow or failing provider never affects the HTTP result.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{order, order_item, product, profile},
    errors::ServiceError,
    notifications::{
        format_phone_number,
        templates::{self, InvoiceLine, MailBranding, OrderConfirmationMail},
        EmailSender, TemplateMessage, WhatsAppSender,
    },
};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without surfacing failure to the caller
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping event");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A UPI order was placed; triggers the confirmation e-mail
    OrderPlaced { order_id: Uuid },
    /// An admin or the gateway confirmed payment; triggers the payment-verified e-mail
    PaymentVerified { order_id: Uuid },
    PaymentFailed { order_id: Uuid },
    /// The cron job cancelled an unpaid order
    OrderAutoCancelled { order_id: Uuid },
    OrderShipped {
        order_id: Uuid,
        tracking_number: Option<String>,
        estimated_delivery: Option<String>,
    },
    /// Customer finished checkout and opted in to WhatsApp updates
    CustomerOrderConfirmed {
        order_reference: String,
        customer_name: String,
        phone_number: String,
        total: Decimal,
    },
}

/// Consumes events and delivers the matching notifications
pub struct NotificationDispatcher {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    whatsapp: Arc<dyn WhatsAppSender>,
    email: Arc<dyn EmailSender>,
}

const DEFAULT_CUSTOMER_NAME: &str = "Customer";
const DEFAULT_ESTIMATED_DELIVERY: &str = "3-5 business days";
const UNKNOWN_PRODUCT_NAME: &str = "Product";

impl NotificationDispatcher {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        whatsapp: Arc<dyn WhatsAppSender>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            db,
            config,
            whatsapp,
            email,
        }
    }

    fn branding(&self) -> MailBranding<'_> {
        MailBranding {
            store_name: &self.config.store.name,
            support_email: &self.config.store.support_email,
            site_url: &self.config.store.site_url,
        }
    }

    async fn load_order(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Option<profile::Model>), ServiceError> {
        order::Entity::find_by_id(order_id)
            .find_also_related(profile::Entity)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    fn recipient_email(order: &order::Model, profile: Option<&profile::Model>) -> Option<String> {
        order
            .shipping_email()
            .or_else(|| profile.and_then(|p| p.email.clone()))
            .filter(|e| !e.trim().is_empty())
    }

    fn customer_name(order: &order::Model, profile: Option<&profile::Model>) -> Option<String> {
        order
            .shipping_name()
            .or_else(|| profile.and_then(|p| p.full_name.clone()))
    }

    #[instrument(skip(self))]
    pub async fn handle(&self, event: Event) -> Result<(), ServiceError> {
        match event {
            Event::OrderPlaced { order_id } => self.send_order_confirmation_email(order_id).await,
            Event::PaymentVerified { order_id } => self.send_payment_verified_email(order_id).await,
            Event::PaymentFailed { order_id } => {
                info!(%order_id, "payment failed; no customer notification");
                Ok(())
            }
            Event::OrderAutoCancelled { order_id } => self.send_auto_cancel_notice(order_id).await,
            Event::OrderShipped {
                order_id,
                tracking_number,
                estimated_delivery,
            } => {
                self.send_shipping_update(order_id, tracking_number, estimated_delivery)
                    .await
            }
            Event::CustomerOrderConfirmed {
                order_reference,
                customer_name,
                phone_number,
                total,
            } => {
                let template = TemplateMessage::order_confirmation(
                    &customer_name,
                    &order_reference,
                    format!("₹{}", templates::format_rupees(total)),
                );
                self.whatsapp.send_template(&phone_number, template).await?;
                Ok(())
            }
        }
    }

    async fn send_order_confirmation_email(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order, profile) = self.load_order(order_id).await?;
        let Some(to) = Self::recipient_email(&order, profile.as_ref()) else {
            debug!(%order_id, "no e-mail address for order confirmation");
            return Ok(());
        };

        let lines = invoice_lines(&self.db, order.id).await?;

        let name = Self::customer_name(&order, profile.as_ref());
        let order_id_text = order.id.to_string();
        let mail = templates::order_confirmation_email(
            &OrderConfirmationMail {
                to: &to,
                customer_name: name.as_deref(),
                order_id: &order_id_text,
                order_number: &order.order_number,
                amount: order.total_amount,
                lines: &lines,
            },
            &self.branding(),
        );
        self.email.send(mail).await?;
        Ok(())
    }

    async fn send_payment_verified_email(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order, profile) = self.load_order(order_id).await?;
        let Some(to) = Self::recipient_email(&order, profile.as_ref()) else {
            debug!(%order_id, "no e-mail address for payment confirmation");
            return Ok(());
        };
        let name = Self::customer_name(&order, profile.as_ref());
        let mail = templates::payment_verified_email(
            &to,
            name.as_deref(),
            &order.order_number,
            order.total_amount,
            &self.branding(),
        );
        self.email.send(mail).await?;
        Ok(())
    }

    async fn send_auto_cancel_notice(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let (order, _) = self.load_order(order_id).await?;
        let Some(phone) = order.shipping_phone() else {
            return Ok(());
        };
        let name = order
            .shipping_name()
            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());
        let body = templates::auto_cancel_message(
            &name,
            &order.order_number,
            self.config.store.pending_order_timeout_mins,
        );
        self.whatsapp
            .send_text(&format_phone_number(&phone), &body)
            .await?;
        Ok(())
    }

    async fn send_shipping_update(
        &self,
        order_id: Uuid,
        tracking_number: Option<String>,
        estimated_delivery: Option<String>,
    ) -> Result<(), ServiceError> {
        let (order, profile) = self.load_order(order_id).await?;
        let Some(phone) = order
            .shipping_phone()
            .or_else(|| profile.as_ref().and_then(|p| p.phone.clone()))
        else {
            return Ok(());
        };
        let name = Self::customer_name(&order, profile.as_ref())
            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string());
        let tracking = tracking_number
            .or_else(|| order.tracking_number.clone())
            .unwrap_or_default();
        let body = templates::shipping_update_message(
            &name,
            &order.order_number,
            &tracking,
            estimated_delivery
                .as_deref()
                .unwrap_or(DEFAULT_ESTIMATED_DELIVERY),
            &self.config.store.site_url,
        );
        self.whatsapp
            .send_text(&format_phone_number(&phone), &body)
            .await?;
        Ok(())
    }
}

/// Order lines with product names, as printed on the confirmation mail
pub async fn invoice_lines(
    db: &DatabaseConnection,
    order_id: Uuid,
) -> Result<Vec<InvoiceLine>, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .find_also_related(product::Entity)
        .all(db)
        .await?;
    Ok(items
        .iter()
        .map(|(item, product)| InvoiceLine {
            name: product
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
            quantity: item.quantity,
            line_total: item.line_total(),
        })
        .collect())
}

/// Runs until every [`EventSender`] is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>, dispatcher: Arc<NotificationDispatcher>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(?event, "received event");
        if let Err(e) = dispatcher.handle(event.clone()).await {
            error!(?event, error = %e, "notification side effect failed");
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{EmailDelivery, MockEmailSender, MockWhatsAppSender};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Set};

    async fn test_db() -> (tempfile::TempDir, Arc<DatabaseConnection>) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("events.sqlite").display());
        let db = crate::db::establish_connection(&url).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        (dir, Arc::new(db))
    }

    async fn insert_order(db: &DatabaseConnection, address: serde_json::Value) -> order::Model {
        let now = Utc::now();
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(Uuid::new_v4()),
            order_number: Set(format!("ORD-{}", now.timestamp_millis())),
            status: Set("cancelled".into()),
            payment_status: Set("failed".into()),
            payment_method: Set(Some("UPI_QR".into())),
            payment_id: Set(None),
            gateway_order_id: Set(None),
            total_amount: Set(dec!(1300)),
            shipping_address: Set(address),
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
        .insert(db)
        .await
        .unwrap()
    }

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            "test".into(),
        ))
    }

    #[tokio::test]
    async fn auto_cancel_notice_goes_to_formatted_shipping_phone() {
        let (_dir, db) = test_db().await;
        let order = insert_order(
            &db,
            serde_json::json!({"name": "Priya", "phone": "98765 43210"}),
        )
        .await;

        let mut whatsapp = MockWhatsAppSender::new();
        let expected_number = order.order_number.clone();
        whatsapp
            .expect_send_text()
            .withf(move |to, body| to.to_string() == "919876543210" && body.contains(&expected_number))
            .times(1)
            .returning(|_, _| Ok(Some("wamid.1".into())));
        let email = MockEmailSender::new();

        let dispatcher =
            NotificationDispatcher::new(db, config(), Arc::new(whatsapp), Arc::new(email));
        dispatcher
            .handle(Event::OrderAutoCancelled { order_id: order.id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn payment_verified_mail_uses_shipping_email() {
        let (_dir, db) = test_db().await;
        let order = insert_order(
            &db,
            serde_json::json!({"fullName": "Anita", "email": "anita@example.com"}),
        )
        .await;

        let whatsapp = MockWhatsAppSender::new();
        let mut email = MockEmailSender::new();
        email
            .expect_send()
            .withf(|mail| {
                mail.to == "anita@example.com"
                    && mail.subject.starts_with("Payment Verified - Order #ORD-")
                    && mail.html.contains("Hi Anita,")
            })
            .times(1)
            .returning(|_| Ok(EmailDelivery::Skipped));

        let dispatcher =
            NotificationDispatcher::new(db, config(), Arc::new(whatsapp), Arc::new(email));
        dispatcher
            .handle(Event::PaymentVerified { order_id: order.id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn orders_without_contact_details_are_skipped() {
        let (_dir, db) = test_db().await;
        let order = insert_order(&db, serde_json::json!({})).await;

        let dispatcher = NotificationDispatcher::new(
            db,
            config(),
            Arc::new(MockWhatsAppSender::new()),
            Arc::new(MockEmailSender::new()),
        );
        dispatcher
            .handle(Event::OrderAutoCancelled { order_id: order.id })
            .await
            .unwrap();
        dispatcher
            .handle(Event::OrderPlaced { order_id: order.id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSender::new(tx)
            .publish(Event::PaymentFailed {
                order_id: Uuid::new_v4(),
            })
            .await;
    }
}
