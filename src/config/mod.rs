use std::time::Duration;

use serde::Deserialize;

use crate::models::region::OutputFormat;
use crate::services::job_store::JobStoreConfig;
use crate::services::pipeline::PipelineLimits;

/// Which object store backs `get`/`put`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// S3-compatible endpoint URL (R2, MinIO, AWS)
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    #[serde(default)]
    pub s3_access_key: Option<String>,

    #[serde(default)]
    pub s3_secret_key: Option<String>,

    /// Encoder quality when a request does not set one (1-100)
    #[serde(default = "default_quality")]
    pub default_quality: u8,

    #[serde(default)]
    pub default_format: OutputFormat,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,

    #[serde(default = "default_max_regions")]
    pub max_regions: usize,

    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,

    /// Seconds a job stays queryable after creation
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Webhook used for jobs submitted without their own URL
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    /// Per-item estimate reported back on batch submission
    #[serde(default = "default_estimated_item_ms")]
    pub estimated_item_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_quality() -> u8 {
    85
}

fn default_max_payload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_max_pixels() -> u64 {
    50_000_000
}

fn default_max_regions() -> usize {
    20
}

fn default_max_batch_items() -> usize {
    100
}

fn default_job_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_jobs() -> usize {
    1000
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_estimated_item_ms() -> u64 {
    500
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn pipeline_limits(&self) -> PipelineLimits {
        PipelineLimits {
            max_payload_bytes: self.max_payload_bytes,
            max_pixels: self.max_pixels,
            max_regions: self.max_regions,
            default_quality: self.default_quality.clamp(1, 100),
            default_format: self.default_format,
        }
    }

    pub fn job_store_config(&self) -> JobStoreConfig {
        JobStoreConfig {
            ttl: Duration::from_secs(self.job_ttl_secs),
            max_jobs: self.max_jobs,
        }
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_env() {
        let config: AppConfig = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.default_quality, 85);
        assert_eq!(config.default_format, OutputFormat::Webp);
        assert_eq!(config.max_regions, 20);
        assert_eq!(config.job_store_config().max_jobs, 1000);
        assert_eq!(config.job_store_config().ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_overrides_from_env() {
        let vars = vec![
            ("STORAGE_BACKEND".to_string(), "memory".to_string()),
            ("DEFAULT_FORMAT".to_string(), "jpeg".to_string()),
            ("DEFAULT_QUALITY".to_string(), "70".to_string()),
            ("MAX_PIXELS".to_string(), "1000".to_string()),
            ("WEBHOOK_URL".to_string(), "https://hooks.example.com/x".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        let limits = config.pipeline_limits();
        assert_eq!(limits.default_format, OutputFormat::Jpeg);
        assert_eq!(limits.default_quality, 70);
        assert_eq!(limits.max_pixels, 1000);
        assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example.com/x"));
    }
}
