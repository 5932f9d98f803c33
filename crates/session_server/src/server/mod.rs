//! Core server implementation and connection handling.
//!
//! This module contains the accept loop, the per-socket frame pump and the
//! liveness reaper.

pub mod core;
mod handlers;
pub mod reaper;

pub use self::core::SessionServer;
pub use reaper::LivenessReaper;
