//! Shared domain types for the leadlamp workspace.
//!
//! - **event**: live-timing topics and the immutable [`event::Event`] record
//! - **timing**: the `TimingAppData` ranking payload and leader extraction
//! - **driver**: driver roster, [`driver::LeaderChange`]
//! - **color**: team colour to CIE 1931 xy conversion
//! - **types**: connection health state shared by the daemon loops
//! - **config**: environment-sourced process configuration

pub mod color;
pub mod config;
pub mod driver;
pub mod event;
pub mod timing;
pub mod types;
