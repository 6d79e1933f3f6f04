//! State module for crawl progress
//!
//! # Components
//!
//! - `ProfileState`: the lifecycle position of one profile URL, derived from
//!   its stored row
//! - `HostThrottle`: lease-based per-host/IP rate limiting on top of the
//!   persistent store

mod host_throttle;
mod profile_state;

pub use host_throttle::HostThrottle;
pub use profile_state::ProfileState;
