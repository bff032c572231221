//! Lifecycle infrastructure for the leadlamp background loops.
//!
//! - **supervisor**: scoped ownership of one long-running task with bounded,
//!   non-propagating cleanup
//! - **shutdown**: process-wide cooperative shutdown flag
//! - **os_signals**: SIGINT / SIGTERM / SIGQUIT as a future

pub mod os_signals;
pub mod shutdown;
pub mod supervisor;

pub use shutdown::ShutdownSignal;
pub use supervisor::{SupervisedTask, TaskOutcome, TaskSupervisor};
