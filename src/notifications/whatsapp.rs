use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{NotificationError, TemplateMessage, WhatsAppSender};
use crate::config::WhatsAppConfig;

static WHATSAPP_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid phone pattern"));

const TEMPLATE_LANGUAGE: &str = "en";

/// E.164 check applied to recipients of ad-hoc messages
pub fn is_valid_whatsapp_number(number: &str) -> bool {
    WHATSAPP_NUMBER.is_match(number)
}

/// Normalises a stored phone number for the Cloud API: digits only, with the
/// Indian country code added to bare ten-digit numbers.
pub fn format_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        format!("91{}", digits)
    } else {
        digits
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    messaging_product: &'static str,
    to: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<TemplateBody>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplateBody {
    name: &'static str,
    language: Language,
    components: Vec<Component>,
}

#[derive(Debug, Serialize)]
struct Language {
    code: &'static str,
}

#[derive(Debug, Serialize)]
struct Component {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: Vec<Parameter>,
}

#[derive(Debug, Serialize)]
struct Parameter {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    messages: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct MessageId {
    id: String,
}

/// WhatsApp Business Cloud API client
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone().filter(|v| !v.trim().is_empty()),
            phone_number_id: config.phone_number_id.clone().filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.phone_number_id.is_some()
    }

    async fn post(&self, request: MessageRequest<'_>) -> Result<Option<String>, NotificationError> {
        let (Some(token), Some(number_id)) = (&self.access_token, &self.phone_number_id) else {
            return Err(NotificationError::NotConfigured("WhatsApp service"));
        };

        let url = format!("{}/{}/messages", self.base_url, number_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "WhatsApp API rejected message");
            return Err(NotificationError::Upstream {
                status: status.as_u16(),
                body: provider_error_message(&body),
            });
        }

        let parsed: MessageResponse = response.json().await?;
        let message_id = parsed.messages.into_iter().next().map(|m| m.id);
        info!(message_id = ?message_id, kind = request.kind, "WhatsApp message sent");
        Ok(message_id)
    }
}

/// Pulls `error.message` out of a Graph API error body, falling back to the raw text
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl WhatsAppSender for WhatsAppClient {
    #[instrument(skip(self, body))]
    async fn send_text(&self, to: &str, body: &str) -> Result<Option<String>, NotificationError> {
        let to: String = to.chars().filter(|c| !c.is_whitespace()).collect();
        self.post(MessageRequest {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: Some(TextBody { body }),
            template: None,
        })
        .await
    }

    #[instrument(skip(self, template), fields(template = template.name))]
    async fn send_template(
        &self,
        to: &str,
        template: TemplateMessage,
    ) -> Result<Option<String>, NotificationError> {
        let parameters = template
            .parameters
            .into_iter()
            .map(|text| Parameter { kind: "text", text })
            .collect();
        self.post(MessageRequest {
            messaging_product: "whatsapp",
            to: format_phone_number(to),
            kind: "template",
            text: None,
            template: Some(TemplateBody {
                name: template.name,
                language: Language {
                    code: TEMPLATE_LANGUAGE,
                },
                components: vec![Component {
                    kind: "body",
                    parameters,
                }],
            }),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> WhatsAppConfig {
        WhatsAppConfig {
            api_base_url: base.to_string(),
            access_token: Some("test-token".into()),
            phone_number_id: Some("10987".into()),
            webhook_verify_token: None,
        }
    }

    #[rstest]
    #[case("+919876543210", true)]
    #[case("+14155550100", true)]
    #[case("919876543210", false)]
    #[case("+0919876543210", false)]
    #[case("+91 98765 43210", false)]
    fn validates_e164_numbers(#[case] number: &str, #[case] valid: bool) {
        assert_eq!(is_valid_whatsapp_number(number), valid);
    }

    #[rstest]
    #[case("98765 43210", "919876543210")]
    #[case("+91-98765-43210", "919876543210")]
    #[case("(415) 555-0100 1", "41555501001")]
    fn formats_phone_numbers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(format_phone_number(raw), expected);
    }

    #[tokio::test]
    async fn sends_text_message_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10987/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "+919876543210",
                "type": "text",
                "text": {"body": "hello"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"messages": [{"id": "wamid.abc"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let id = client.send_text("+919876543210", "hello").await.unwrap();
        assert_eq!(id.as_deref(), Some("wamid.abc"));
    }

    #[tokio::test]
    async fn template_messages_use_formatted_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10987/messages"))
            .and(body_partial_json(serde_json::json!({
                "to": "919876543210",
                "type": "template",
                "template": {"name": "welcome_message", "language": {"code": "en"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let id = client
            .send_template("98765 43210", TemplateMessage::welcome_message("Priya"))
            .await
            .unwrap();
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn upstream_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "(#131030) Recipient phone number not in allowed list"}
            })))
            .mount(&server)
            .await;

        let client = WhatsAppClient::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let err = client.send_text("+919876543210", "hi").await.unwrap_err();
        match err {
            NotificationError::Upstream { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("131030"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.access_token = None;
        let client = WhatsAppClient::new(&cfg, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        let err = client.send_text("+919876543210", "hi").await.unwrap_err();
        assert!(matches!(err, NotificationError::NotConfigured(_)));
    }
}
