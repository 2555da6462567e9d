//! Outbound hop to the image host.
//!
//! The relay talks to the host through the [`ImageHost`] trait. [`ReqwestImageHost`] is the
//! production implementation: it re-packages the validated upload as a fresh multipart form,
//! attaches the credential header, and bounds the whole exchange with a deadline.

use anyhow::anyhow;
use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use reqwest::{
    Body, Client,
    multipart::{Form, Part},
};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::api::models::upload::{FALLBACK_CONTENT_TYPE, FILE_FIELD, ProviderResponse, UploadRequest};
use crate::config::ProviderConfig;
use crate::errors::{Error, Result};

/// Something that can store an image and answer with the host's raw response.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<ProviderResponse>;
}

/// The concrete implementation of `ImageHost`, over HTTP(S) with `reqwest`.
pub struct ReqwestImageHost {
    client: Client,
    url: Url,
    credential_header: HeaderName,
    credential_value: HeaderValue,
    timeout: Duration,
}

impl ReqwestImageHost {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        crate::ensure_crypto_provider();

        let credential = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("provider.api_key is not configured"))?;
        let credential_header = HeaderName::from_bytes(config.api_key_header.as_bytes())?;
        let mut credential_value = HeaderValue::from_str(credential.expose_secret())
            .map_err(|_| anyhow!("provider.api_key contains characters not allowed in a header"))?;
        credential_value.set_sensitive(true);
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            credential_header,
            credential_value,
            timeout: config.timeout,
        })
    }

    async fn send(&self, request: &UploadRequest) -> Result<ProviderResponse> {
        let form = Form::new().part(FILE_FIELD, file_part(request)?);

        let response = self
            .client
            .post(self.url.clone())
            .header(self.credential_header.clone(), self.credential_value.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::downstream("Failed to reach the image host", e)
                } else {
                    Error::downstream("Upload to the image host failed", e)
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::downstream("Failed to read the image host response", e))?;

        debug!(status = %status, body_len = body.len(), "Image host responded");

        if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
            return Err(Error::downstream(
                "Image host returned an invalid response",
                anyhow!("status {status}, body is not JSON: {e}"),
            ));
        }

        Ok(ProviderResponse { status, body })
    }
}

/// Builds the outbound file part, keeping the uploader's filename and content type.
fn file_part(request: &UploadRequest) -> Result<Part> {
    let part = || {
        Part::stream_with_length(Body::from(request.bytes.clone()), request.size_bytes() as u64).file_name(request.filename.clone())
    };

    part()
        .mime_str(&request.content_type)
        .or_else(|_| part().mime_str(FALLBACK_CONTENT_TYPE))
        .map_err(|e| Error::downstream("Failed to prepare the upload", e))
}

#[async_trait]
impl ImageHost for ReqwestImageHost {
    #[instrument(skip_all, fields(filename = %request.filename, size = request.size_bytes()))]
    async fn upload(&self, request: UploadRequest) -> Result<ProviderResponse> {
        match tokio::time::timeout(self.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::downstream(
                "Image host did not respond in time",
                anyhow!("no response within {:?}", self.timeout),
            )),
        }
    }
}
