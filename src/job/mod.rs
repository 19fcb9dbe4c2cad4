pub mod emergency_job;
pub mod grid_job;

pub use emergency_job::{EmergencyCloser, EmergencyCloseResult};
pub use grid_job::GridJob;
