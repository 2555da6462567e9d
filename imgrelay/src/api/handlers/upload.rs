use axum::{
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use tracing::{info, instrument};

use crate::AppState;
use crate::api::models::upload::{
    ErrorEnvelope, FALLBACK_CONTENT_TYPE, FILE_FIELD, HostedImageResponse, UploadForm, UploadRequest,
};
use crate::errors::{Error, Result};

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "upload",
    summary = "Upload image",
    description = "Relay a single image to the configured image host. The file must be sent in the `source` field; \
    other fields are ignored. The host's status code and JSON body are returned unchanged.",
    request_body(
        content = UploadForm,
        content_type = "multipart/form-data",
        description = "Multipart form with the image in the `source` field"
    ),
    responses(
        (status = 200, description = "Image host response, relayed verbatim", body = HostedImageResponse),
        (status = 400, description = "No usable file in the `source` field", body = ErrorEnvelope),
        (status = 413, description = "Payload too large", body = ErrorEnvelope),
        (status = 500, description = "The request could not be read or the image host could not be reached", body = ErrorEnvelope)
    )
)]
#[instrument(skip_all)]
pub async fn upload_image(State(state): State<AppState>, multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Response> {
    let multipart = multipart.map_err(|e| Error::InvalidFileField {
        message: format!("Expected a multipart/form-data request: {}", e.body_text()),
    })?;

    let request = read_upload(multipart, state.config.limits.max_file_size).await?;

    info!(
        filename = %request.filename,
        content_type = %request.content_type,
        size = request.size_bytes(),
        "Forwarding upload to image host"
    );

    let provider_response = state.image_host.upload(request).await?;

    info!(status = %provider_response.status, "Image host response relayed");

    Ok((
        provider_response.status,
        [(header::CONTENT_TYPE, "application/json")],
        provider_response.body,
    )
        .into_response())
}

/// Pulls the first `source` file out of the form, buffering it up to `max_file_size` bytes.
async fn read_upload(mut multipart: Multipart, max_file_size: u64) -> Result<UploadRequest> {
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge { limit: max_file_size }
        } else {
            Error::downstream("Failed to read the upload request", e)
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some(FILE_FIELD) {
            // Ignore unknown fields
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::InvalidFileField {
                message: format!("Field '{FILE_FIELD}' must be a file upload"),
            })?;
        let content_type = field.content_type().unwrap_or(FALLBACK_CONTENT_TYPE).to_string();

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(read_error)? {
            // Check size limit incrementally to fail fast
            if (buffer.len() + chunk.len()) as u64 > max_file_size {
                tracing::warn!(
                    filename = %filename,
                    max_file_size = max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                return Err(Error::PayloadTooLarge { limit: max_file_size });
            }
            buffer.extend_from_slice(&chunk);
        }

        if buffer.is_empty() {
            return Err(Error::InvalidFileField {
                message: "File cannot be empty".to_string(),
            });
        }

        return Ok(UploadRequest {
            bytes: buffer.freeze(),
            filename,
            content_type,
        });
    }

    Err(Error::InvalidFileField {
        message: "No file found in the request".to_string(),
    })
}
