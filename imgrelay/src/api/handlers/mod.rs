//! HTTP request handlers.
//!
//! - [`upload`]: the relay endpoint that forwards a browser upload to the image host
//!
//! Handlers return [`crate::errors::Error`], which converts to the `{ "error": ... }` JSON
//! envelope with the matching HTTP status.

pub mod upload;
