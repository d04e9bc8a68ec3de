//! Direct-to-storage PUT

use super::describe_failure;
use crate::upload::{ObjectStore, UploadError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Uploads bytes to a signed URL with a plain HTTP PUT
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[tracing::instrument(
        name = "storage.put",
        skip(self, url, body),
        fields(
            http.method = "PUT",
            http.content_type = %content_type,
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put(&self, url: &str, body: Bytes, content_type: &str) -> Result<(), UploadError> {
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;

        tracing::Span::current().record("http.status_code", response.status().as_u16());

        if !response.status().is_success() {
            return Err(UploadError::Transfer(describe_failure(response).await));
        }
        Ok(())
    }
}
