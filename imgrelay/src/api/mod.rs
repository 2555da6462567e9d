//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures, including the relay's error envelope
//!
//! OpenAPI documentation is generated with `utoipa` and served at `/docs`.

pub mod handlers;
pub mod models;
