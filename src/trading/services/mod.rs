pub mod executor_service;
pub mod filter_service;
pub mod system_status;

pub use executor_service::{ExecutionReport, ExecutorService};
pub use system_status::{GateStatus, SystemStatusService};
