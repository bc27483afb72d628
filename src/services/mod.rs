pub mod compositor;
pub mod coordinates;
pub mod encoder;
pub mod job_store;
pub mod orchestrator;
pub mod pipeline;
pub mod storage;
pub mod webhook;
