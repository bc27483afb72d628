//! Region redaction service
//!
//! Blurs, pixelates or fills rectangular regions of JPEG, PNG and WebP
//! images, either inline over HTTP or between objects in S3-compatible
//! storage. Storage redactions can be batched into background jobs whose
//! progress is polled by id and announced through a webhook.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
