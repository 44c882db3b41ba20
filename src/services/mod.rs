pub mod access;
pub mod ingest;
pub mod orchestrator;
pub mod storage;
pub mod zone_store;
