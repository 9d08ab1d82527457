//! HTTP API handlers
//!
//! `GET /health`, `POST /search`, `GET /tasks/:id`, `DELETE /tasks/:id`

pub mod health;
pub mod search;
pub mod tasks;

pub use health::health_routes;
pub use search::search_routes;
pub use tasks::task_routes;
