//! SQLite persistence for the sync watermark, partition statuses and run lease.

mod model;
mod repository;

pub use model::{SyncPartitionStatusDB, SyncRunLeaseDB, SyncWatermarkDB};
pub use repository::WatermarkRepository;
