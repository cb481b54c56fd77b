//! Outbound customer messaging: WhatsApp Business Cloud API and Resend e-mail.
//!
//! Both providers sit behind small async traits so that background consumers
//! and tests can swap the HTTP clients for mocks.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::errors::ServiceError;

pub mod email;
pub mod templates;
pub mod whatsapp;

pub use email::ResendClient;
pub use whatsapp::{format_phone_number, is_valid_whatsapp_number, WhatsAppClient};

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected request ({status}): {body}")]
    Upstream { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotConfigured(service) => {
                ServiceError::NotConfigured(service.to_string())
            }
            NotificationError::InvalidRecipient(msg) => ServiceError::BadRequest(msg),
            NotificationError::Upstream { body, .. } => {
                ServiceError::upstream("Failed to send WhatsApp message", Some(body))
            }
            NotificationError::Http(e) => {
                ServiceError::upstream("Failed to reach messaging provider", Some(e.to_string()))
            }
            NotificationError::Serialization(e) => ServiceError::SerializationError(e.to_string()),
        }
    }
}

/// Body parameter of a pre-approved WhatsApp template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateMessage {
    pub name: &'static str,
    pub parameters: Vec<String>,
}

impl TemplateMessage {
    pub fn cart_abandonment_reminder(name: &str, items: String, total: String) -> Self {
        Self {
            name: "cart_abandonment_reminder",
            parameters: vec![name.to_string(), items, total],
        }
    }

    pub fn order_confirmation(name: &str, order_id: &str, total: String) -> Self {
        Self {
            name: "order_confirmation",
            parameters: vec![name.to_string(), order_id.to_string(), total],
        }
    }

    pub fn welcome_message(name: &str) -> Self {
        Self {
            name: "welcome_message",
            parameters: vec![name.to_string()],
        }
    }
}

/// Sends WhatsApp messages; returns the provider's message id when one is reported
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<Option<String>, NotificationError>;

    async fn send_template(
        &self,
        to: &str,
        template: TemplateMessage,
    ) -> Result<Option<String>, NotificationError>;
}

/// A rendered transactional e-mail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outcome of an e-mail send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailDelivery {
    Sent(Option<String>),
    /// No API key is configured; nothing was sent
    Skipped,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<EmailDelivery, NotificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn not_configured_maps_to_server_error_with_exact_message() {
        let err: ServiceError = NotificationError::NotConfigured("WhatsApp service").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "WhatsApp service not configured");
    }

    #[test]
    fn upstream_rejection_keeps_provider_details() {
        let err: ServiceError = NotificationError::Upstream {
            status: 400,
            body: "Invalid parameter".into(),
        }
        .into();
        assert_eq!(err.details().as_deref(), Some("Invalid parameter"));
    }
}
