//! Pharmacy Chat - streaming conversation engine
//!
//! Reconstructs an assistant conversation from an incremental event
//! stream and publishes consistent snapshots to a presentation layer.

pub mod api;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod sse;
pub mod state_machine;
pub mod transport;
pub mod wire;
