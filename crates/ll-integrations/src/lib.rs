//! External collaborators of the leadlamp core.
//!
//! - **hue**: the lamp actuator, a Philips Hue bridge client (CLIP v2)
//! - **feed**: event sources and the feed read loop that hands events to
//!   an [`feed::EventHandler`]

pub mod feed;
pub mod hue;
