//! HTTP API for controlling the voice session
//!
//! - POST /session/start - Start listening
//! - POST /session/stop - Stop and return final stats
//! - GET /session/status - Current session stats
//! - GET /session/exchanges - Dialogue so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, SessionFactory};
