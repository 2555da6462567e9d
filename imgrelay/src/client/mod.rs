//! Upload client: the caller side of the relay contract.
//!
//! [`UploadClient`] holds what an upload page holds: the selected file, the last result, and a
//! couple of transient flags. It accepts only image files, submits one upload at a time to
//! `POST <relay>/api/upload`, and turns the relayed response into either the hosted URL or a
//! single display message.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use imgrelay::client::{Clipboard, FileCandidate, UploadClient};
//! # async fn run(clipboard: Arc<dyn Clipboard>) -> anyhow::Result<()> {
//! let client = UploadClient::new("http://localhost:3000".parse()?, clipboard)?;
//! client.select_file(FileCandidate::new(std::fs::read("cat.png")?, "cat.png", "image/png"));
//! let url = client.submit().await?;
//! client.copy_link(&url).await;
//! # Ok(())
//! # }
//! ```

mod messages;

pub use messages::Locale;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use url::Url;

use crate::api::models::upload::{FALLBACK_CONTENT_TYPE, FILE_FIELD};

/// Path of the relay endpoint, relative to the relay base URL.
pub const UPLOAD_PATH: &str = "api/upload";

/// A file picked or dropped by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
}

impl FileCandidate {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// What the page shows after an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadResult {
    Success { url: String },
    Failure { error_message: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Submit was called with nothing selected
    #[error("No file selected")]
    NoFileSelected,

    /// Another submission has not finished yet
    #[error("An upload is already in progress")]
    UploadInFlight,

    /// The relay answered with a non-2xx status, or could not be reached (`status` is `None`)
    #[error("Relay request failed (status: {status:?})")]
    RelayUnreachable { status: Option<u16>, message: Option<String> },

    /// The relay answered 2xx but the image host's body does not carry a hosted URL
    #[error("Image host rejected the upload")]
    ProviderRejected { message: Option<String> },
}

impl ClientError {
    /// The single message shown to the user for this failure.
    pub fn user_message(&self, locale: Locale) -> String {
        match self {
            ClientError::NoFileSelected => locale.no_file_selected().to_string(),
            ClientError::UploadInFlight => locale.upload_in_flight().to_string(),
            ClientError::RelayUnreachable {
                message: Some(message), ..
            } => message.clone(),
            ClientError::RelayUnreachable {
                status: Some(status),
                message: None,
            } => locale.relay_status(*status),
            ClientError::RelayUnreachable { status: None, message: None } => locale.upload_error().to_string(),
            ClientError::ProviderRejected { message } => {
                message.clone().unwrap_or_else(|| locale.upload_failed().to_string())
            }
        }
    }
}

/// Where copied links go. Failures are logged by the client, never shown.
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Snapshot of the client's state, as a page would render it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    pub selected: Option<FileCandidate>,
    pub result: Option<UploadResult>,
    /// Set after a successful copy of the link, cleared by `reset`
    pub copied: bool,
}

impl ClientState {
    pub fn uploaded_link(&self) -> Option<&str> {
        match &self.result {
            Some(UploadResult::Success { url }) => Some(url),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            Some(UploadResult::Failure { error_message }) => Some(error_message),
            _ => None,
        }
    }
}

pub struct UploadClient {
    http: reqwest::Client,
    endpoint: Url,
    locale: Locale,
    clipboard: Arc<dyn Clipboard>,
    in_flight: AtomicBool,
    state: Mutex<ClientState>,
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

impl UploadClient {
    /// Create a client for the relay served at `relay_url`.
    pub fn new(relay_url: Url, clipboard: Arc<dyn Clipboard>) -> anyhow::Result<Self> {
        crate::ensure_crypto_provider();

        let endpoint = ensure_slash(&relay_url).join(UPLOAD_PATH)?;
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            endpoint,
            locale: Locale::default(),
            clipboard,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ClientState::default()),
        })
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> ClientState {
        self.lock_state().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select a file for upload. Anything that is not a non-empty image is ignored and leaves
    /// the state untouched. Returns whether the candidate was accepted.
    pub fn select_file(&self, candidate: FileCandidate) -> bool {
        if !candidate.is_image() || candidate.size_bytes() == 0 {
            debug!(filename = %candidate.filename, mime_type = %candidate.mime_type, "Ignoring non-image file");
            return false;
        }

        let mut state = self.lock_state();
        state.selected = Some(candidate);
        state.result = None;
        state.copied = false;
        true
    }

    /// Upload the selected file through the relay and return the hosted URL.
    ///
    /// The outcome is also recorded in [`ClientState::result`], except for an
    /// [`ClientError::UploadInFlight`] refusal, which leaves the running upload's state alone.
    pub async fn submit(&self) -> Result<String, ClientError> {
        let Some(file) = self.lock_state().selected.clone() else {
            return Err(self.record_failure(ClientError::NoFileSelected));
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // The running upload owns the displayed result
            return Err(ClientError::UploadInFlight);
        }
        // Cleared on every exit, including when this future is dropped mid-upload
        let _in_flight = scopeguard::guard((), |_| self.in_flight.store(false, Ordering::Release));

        self.lock_state().result = None;

        match self.send(&file).await {
            Ok(url) => {
                self.lock_state().result = Some(UploadResult::Success { url: url.clone() });
                Ok(url)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn record_failure(&self, error: ClientError) -> ClientError {
        let error_message = error.user_message(self.locale);
        warn!(error = %error, "Upload error: {}", error_message);
        self.lock_state().result = Some(UploadResult::Failure { error_message });
        error
    }

    async fn send(&self, file: &FileCandidate) -> Result<String, ClientError> {
        let form = Form::new().part(FILE_FIELD, file_part(file));

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach the upload relay: {}", e);
                ClientError::RelayUnreachable {
                    status: None,
                    message: None,
                }
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read the upload relay response: {}", e);
            ClientError::RelayUnreachable {
                status: Some(status.as_u16()),
                message: None,
            }
        })?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .as_ref()
                .and_then(error_message)
                .filter(|message| !message.trim().is_empty());
            return Err(ClientError::RelayUnreachable {
                status: Some(status.as_u16()),
                message,
            });
        }

        extract_hosted_url(&body)
    }

    /// Clear selection, result and transient flags. No I/O.
    pub fn reset(&self) {
        *self.lock_state() = ClientState::default();
    }

    /// Best-effort copy of `url` to the clipboard.
    pub async fn copy_link(&self, url: &str) {
        match self.clipboard.write_text(url).await {
            Ok(()) => self.lock_state().copied = true,
            Err(e) => warn!("Failed to copy: {:#}", e),
        }
    }
}

fn file_part(file: &FileCandidate) -> Part {
    let part = || Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone());

    match part().mime_str(&file.mime_type) {
        Ok(part) => part,
        Err(_) => part().mime_str(FALLBACK_CONTENT_TYPE).unwrap_or_else(|_| part()),
    }
}

/// Pull the hosted URL out of a relayed image host body.
///
/// Success means a numeric `status_code` of 200 and a string at `image.url`; anything else is a
/// rejection, carrying `error.message` when the host supplied one.
pub fn extract_hosted_url(body: &[u8]) -> Result<String, ClientError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ClientError::ProviderRejected { message: None })?;

    if value.get("status_code").and_then(Value::as_u64) == Some(200)
        && let Some(url) = value.pointer("/image/url").and_then(Value::as_str)
    {
        return Ok(url.to_string());
    }

    Err(ClientError::ProviderRejected {
        message: error_message(&value),
    })
}

/// The relay's `{ "error": "..." }` envelope or the host's `{ "error": { "message": "..." } }`.
fn error_message(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
        .map(str::to_string)
}
