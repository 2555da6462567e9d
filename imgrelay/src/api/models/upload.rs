//! Request and response models for the upload relay.

use axum::http::StatusCode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Name of the multipart field carrying the image, on both the inbound and outbound hop.
pub const FILE_FIELD: &str = "source";

/// Content type used when the uploader did not declare a usable one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Uniform error body returned by the relay for every failure it produces itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Human-readable, user-safe error message
    pub error: String,
}

/// A validated upload, fully buffered and ready to be forwarded.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
}

impl UploadRequest {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// What the image host answered, passed back to the caller untouched.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Multipart form accepted by `POST /api/upload`.
#[derive(ToSchema)]
#[allow(unused)]
pub struct UploadForm {
    /// The image file. Filename and content type are forwarded as declared.
    #[schema(value_type = String, format = Binary)]
    pub source: Vec<u8>,
}

/// Shape of the image host's JSON answer, relayed verbatim.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HostedImageResponse {
    /// 200 when the image was stored
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<HostedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HostedImage {
    /// Public URL of the hosted image
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HostError {
    pub message: String,
}
