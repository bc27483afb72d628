use std::sync::Arc;

use crate::services::{
    job_store::JobStore, orchestrator::BatchOrchestrator, pipeline::RedactionPipeline,
    storage::ObjectStore, webhook::WebhookNotifier,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RedactionPipeline,
    pub jobs: Arc<JobStore>,
    pub orchestrator: BatchOrchestrator,
    pub max_batch_items: usize,
    pub estimated_item_ms: u64,
}

impl AppState {
    pub fn new(
        pipeline: RedactionPipeline,
        storage: Arc<dyn ObjectStore>,
        jobs: JobStore,
        notifier: WebhookNotifier,
        default_webhook_url: Option<String>,
    ) -> Self {
        let jobs = Arc::new(jobs);
        let orchestrator = BatchOrchestrator::new(
            storage,
            jobs.clone(),
            pipeline.clone(),
            Arc::new(notifier),
            default_webhook_url,
        );

        Self {
            pipeline,
            jobs,
            orchestrator,
            max_batch_items: 100,
            estimated_item_ms: 500,
        }
    }

    pub fn with_batch_limits(mut self, max_batch_items: usize, estimated_item_ms: u64) -> Self {
        self.max_batch_items = max_batch_items;
        self.estimated_item_ms = estimated_item_ms;
        self
    }
}
