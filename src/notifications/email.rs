use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{EmailDelivery, EmailSender, NotificationError, OutgoingEmail};
use crate::config::{EmailConfig, StoreConfig};

const FALLBACK_FROM: &str = "noreply@example.com";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

/// Resend transactional e-mail client
#[derive(Clone)]
pub struct ResendClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    from: String,
}

impl ResendClient {
    pub fn new(
        config: &EmailConfig,
        store: &StoreConfig,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let from = config
            .from_address
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| Some(store.support_email.clone()).filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| FALLBACK_FROM.to_string());

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|v| !v.trim().is_empty()),
            from,
        })
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: OutgoingEmail) -> Result<EmailDelivery, NotificationError> {
        let Some(api_key) = &self.api_key else {
            warn!("email API key not configured - email not sent");
            return Ok(EmailDelivery::Skipped);
        };

        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&SendEmailRequest {
                from: &self.from,
                to: [email.to.as_str()],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendEmailResponse = response.json().await?;
        info!(email_id = ?parsed.id, "email sent");
        Ok(EmailDelivery::Sent(parsed.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "customer@example.com".into(),
            subject: "Payment Verified - Order #ORD-1".into(),
            html: "<p>ok</p>".into(),
        }
    }

    #[tokio::test]
    async fn skips_when_no_api_key() {
        let client = ResendClient::new(
            &EmailConfig::default(),
            &StoreConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.send(email()).await.unwrap(), EmailDelivery::Skipped);
    }

    #[tokio::test]
    async fn posts_to_resend_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({
                "from": "orders@elegancesarees.com",
                "to": ["customer@example.com"],
                "subject": "Payment Verified - Order #ORD-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "em_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = EmailConfig {
            api_base_url: server.uri(),
            api_key: Some("re_test".into()),
            from_address: Some("orders@elegancesarees.com".into()),
        };
        let client =
            ResendClient::new(&config, &StoreConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.send(email()).await.unwrap(),
            EmailDelivery::Sent(Some("em_1".into()))
        );
    }

    #[test]
    fn from_address_falls_back_to_support_email() {
        let client = ResendClient::new(
            &EmailConfig::default(),
            &StoreConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.from_address(), "admin@elegancesarees.com");
    }
}
