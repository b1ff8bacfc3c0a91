//! Utility modules shared across the crate

pub mod logging;

pub use logging::{log_operation_complete, log_operation_start};
