//! API request/response models.

pub mod upload;
