//! Visit sync domain models, ports and the sync engine.

mod partition_strategy;
mod sync_model;
mod sync_orchestrator;
mod sync_ports;
mod sync_scheduler;
mod user_correlator;
mod window_planner;

pub use partition_strategy::*;
pub use sync_model::*;
pub use sync_orchestrator::*;
pub use sync_ports::*;
pub use sync_scheduler::*;
pub use user_correlator::*;
pub use window_planner::*;
