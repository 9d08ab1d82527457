//! pharmyrus-fusion library interface
//!
//! Multi-source pharmaceutical patent search: strategy execution, field
//! extraction, merge, enrichment and audit, plus the HTTP service that
//! exposes them.

pub mod api;
pub mod audit;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod executor;
pub mod extractors;
pub mod merger;
pub mod normalizer;
pub mod report;
pub mod sources;
pub mod strategies;
pub mod synonyms;
pub mod tasks;
pub mod types;

pub use crate::engine::{FusionEngine, NoProgress, ProgressSink};
pub use crate::error::{ApiError, ApiResult};
pub use crate::report::SearchReport;
pub use crate::tasks::{TaskHandle, TaskManager, TaskState};

use axum::Router;
use chrono::{DateTime, Utc};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Owns the engine and the background task table
    pub tasks: TaskManager,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(tasks: TaskManager) -> Self {
        Self {
            tasks,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::search_routes())
        .merge(api::task_routes())
        .with_state(state)
}
