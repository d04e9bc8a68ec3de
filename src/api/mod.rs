//! Backend API client
//!
//! [`ApiClient`] talks to the platform backend that issues signed upload URLs
//! and stores document records. [`HttpObjectStore`] performs the direct PUT to
//! storage.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | Signed URL | `POST {base}/storage/signed-url` | `{"url": "..."}` |
//! | Register document | `POST {base}/knowledge-bases/{id}/documents` | document JSON |
//!
//! # Example
//!
//! ```no_run
//! use kb_uploadr::api::{ApiClient, HttpObjectStore};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new("https://api.example.com", Some("token".into()), Duration::from_secs(30))?;
//! let store = HttpObjectStore::new(Duration::from_secs(300))?;
//! # Ok(())
//! # }
//! ```

use crate::config::ApiConfig;
use crate::upload::{
    Document, DocumentRegistrar, DocumentRegistration, SignedUrlIssuer, SignedUrlRequest,
    UploadError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

mod storage;

pub use storage::HttpObjectStore;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlBody<'a> {
    bucket: &'a str,
    key: &'a str,
    content_type: &'a str,
    metadata: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(alias = "signedUrl")]
    url: String,
}

/// HTTP client for the signed-URL issuer and document registrar
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.base_url, config.token.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-2xx response into `"HTTP {status}: {body}"`
async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.trim())
    }
}

#[async_trait]
impl SignedUrlIssuer for ApiClient {
    #[tracing::instrument(
        name = "api.signed_url",
        skip(self, request),
        fields(storage.bucket = %request.bucket, storage.key = %request.key),
        err
    )]
    async fn signed_url(&self, request: &SignedUrlRequest) -> Result<String, UploadError> {
        let body = SignedUrlBody {
            bucket: &request.bucket,
            key: &request.key,
            content_type: &request.content_type,
            metadata: &request.metadata,
        };

        let response = self
            .post("/storage/signed-url")
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Acquisition(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Acquisition(describe_failure(response).await));
        }

        let parsed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Acquisition(format!("invalid response: {}", e)))?;
        Ok(parsed.url)
    }
}

#[async_trait]
impl DocumentRegistrar for ApiClient {
    #[tracing::instrument(
        name = "api.register_document",
        skip(self, registration),
        fields(
            knowledge_base = %registration.knowledge_base_id,
            document.name = %registration.name,
            document.size = registration.size
        ),
        err
    )]
    async fn register(
        &self,
        registration: &DocumentRegistration,
    ) -> Result<Document, UploadError> {
        let path = format!(
            "/knowledge-bases/{}/documents",
            urlencoding::encode(&registration.knowledge_base_id)
        );

        let response = self
            .post(&path)
            .json(registration)
            .send()
            .await
            .map_err(|e| UploadError::Registration(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Registration(describe_failure(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::Registration(format!("invalid response: {}", e)))
    }
}
