//! The leadlamp daemon: turns race-leader changes in the live-timing feed
//! into lamp colour changes, delayed to line up with the TV broadcast.
//!
//! - **tracker**: leader extraction and deduplication per feed event
//! - **delay_queue**: broadcast-delay scheduling with coalesce-to-latest drain
//! - **health**: feed liveness state machine and its sampling loop
//! - **daemon**: process-level orchestration of the supervised loops

pub mod daemon;
pub mod delay_queue;
pub mod health;
pub mod tracker;
