//! HTTP API serving a producer over server-sent events
//!
//! Mirrors the pharmacy backend's chat surface so the live client can be
//! exercised without the real service.

mod handlers;
mod sse;

pub use handlers::create_router;

use crate::transport::EventProducer;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<dyn EventProducer>,
}

impl AppState {
    pub fn new(producer: Arc<dyn EventProducer>) -> Self {
        Self { producer }
    }
}
