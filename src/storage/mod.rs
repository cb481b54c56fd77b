//! Object storage for customer uploads (payment-proof screenshots).
//!
//! Objects are written through the Supabase Storage REST API and served from
//! its public bucket URLs.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{config::StorageConfig, errors::ServiceError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage not configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage rejected upload ({status}): {body}")]
    Upstream { status: u16, body: String },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotConfigured => ServiceError::NotConfigured("Object storage".to_string()),
            StorageError::Http(e) => {
                ServiceError::upstream("Failed to reach object storage", Some(e.to_string()))
            }
            StorageError::Upstream { body, .. } => {
                ServiceError::upstream("Failed to store upload", Some(body))
            }
        }
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes `bytes` to `bucket/path`, replacing any existing object
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Public URL of a stored object
    fn public_url(&self, bucket: &str, path: &str) -> Result<String, StorageError>;
}

/// Supabase Storage client authenticated with the service key
#[derive(Clone)]
pub struct StorageApiClient {
    http: reqwest::Client,
    base_url: Option<String>,
    service_key: Option<String>,
}

impl StorageApiClient {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config
                .api_base_url
                .as_deref()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            service_key: config.service_key.clone().filter(|v| !v.trim().is_empty()),
        })
    }

    fn base_url(&self) -> Result<&str, StorageError> {
        self.base_url.as_deref().ok_or(StorageError::NotConfigured)
    }
}

#[async_trait]
impl ObjectStorage for StorageApiClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let (base_url, Some(key)) = (self.base_url()?, &self.service_key) else {
            warn!("storage service key not configured");
            return Err(StorageError::NotConfigured);
        };

        let response = self
            .http
            .post(format!("{}/storage/v1/object/{}/{}", base_url, bucket, path))
            .bearer_auth(key)
            .header("apikey", key)
            .header("x-upsert", "true")
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        info!("object stored");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url()?,
            bucket,
            path
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: Option<String>, key: Option<&str>) -> StorageApiClient {
        let config = StorageConfig {
            api_base_url: base,
            service_key: key.map(str::to_owned),
            ..Default::default()
        };
        StorageApiClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn uploads_with_service_key_and_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/payment-proofs/proofs/u1/o1.jpg"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("apikey", "service-key"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Key": "payment-proofs/proofs/u1/o1.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = client(Some(server.uri()), Some("service-key"));
        storage
            .put_object("payment-proofs", "proofs/u1/o1.jpg", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(
            storage.public_url("payment-proofs", "proofs/u1/o1.jpg").unwrap(),
            format!("{}/storage/v1/object/public/payment-proofs/proofs/u1/o1.jpg", server.uri())
        );
    }

    #[tokio::test]
    async fn rejected_upload_reports_provider_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bucket not found"))
            .mount(&server)
            .await;

        let err = client(Some(server.uri()), Some("k"))
            .put_object("missing", "a.jpg", vec![0], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Upstream { status: 403, ref body } if body == "bucket not found"));
    }

    #[tokio::test]
    async fn unconfigured_storage_refuses_uploads() {
        let err = client(None, Some("k"))
            .put_object("b", "a.jpg", vec![0], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));
        let err = client(Some("http://localhost:1".into()), None)
            .put_object("b", "a.jpg", vec![0], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured));
    }
}
