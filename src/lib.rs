pub mod cold_import;
pub mod indexer;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod sync;
pub mod transformer;
pub mod utils;
