use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::region::{OutputFormat, Region};

/// An object location in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StorageLocation {
    #[garde(length(min = 3, max = 63))]
    pub bucket: String,

    #[garde(length(min = 1, max = 1024))]
    pub key: String,
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Redact one stored image and write the result back to storage.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RedactStorageRequest {
    #[garde(dive)]
    pub input: StorageLocation,

    #[garde(dive)]
    pub output: StorageLocation,

    #[garde(length(min = 1), dive)]
    pub regions: Vec<Region>,

    #[serde(default)]
    #[garde(skip)]
    pub format: Option<OutputFormat>,

    #[serde(default)]
    #[garde(range(min = 1, max = 100))]
    pub quality: Option<u8>,

    #[serde(default)]
    #[garde(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

/// Submit several storage redactions as one job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchRequest {
    #[garde(length(min = 1), dive)]
    pub items: Vec<RedactStorageRequest>,

    #[serde(default)]
    #[garde(url)]
    pub webhook_url: Option<String>,
}

/// Response after submitting a batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSubmitResponse {
    pub job_id: uuid::Uuid,
    pub items_count: usize,
    pub estimated_completion_ms: u64,
}

/// Multipart `regions` part and query options for the in-memory route.
#[derive(Debug, Deserialize, Validate)]
pub struct InlineOptions {
    #[garde(length(min = 1), dive)]
    pub regions: Vec<Region>,

    #[serde(default)]
    #[garde(skip)]
    pub format: Option<OutputFormat>,

    #[serde(default)]
    #[garde(range(min = 1, max = 100))]
    pub quality: Option<u8>,
}
