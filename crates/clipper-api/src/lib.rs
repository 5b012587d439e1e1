//! Axum HTTP API server for on-demand media clipping.
//!
//! `POST /clip` validates a clip request, waits for a transcoder slot,
//! runs the transcoder in a per-job scratch area and streams the result
//! back on the same connection.

pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::AbandonedJobSweeper;
pub use state::AppState;
