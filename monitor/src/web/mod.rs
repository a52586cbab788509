pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::context::MonitoringContext;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<MonitoringContext>,
}

impl AppState {
    pub fn new(context: Arc<MonitoringContext>) -> Self {
        Self { context }
    }
}
