pub mod job;
pub mod redact;
pub mod region;
