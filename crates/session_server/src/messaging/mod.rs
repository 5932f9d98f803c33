//! Basic message framing for client-server communication.
//!
//! The admission core only needs enough framing to hand a structured message
//! to the callback a collaborator registers on a [`Connection`](crate::Connection).
//! What the namespaces and events mean is up to that collaborator.

pub mod types;

pub use types::{parse_frame, ClientMessage};
