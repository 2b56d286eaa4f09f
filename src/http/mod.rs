//! HTTP API server for external control (voice UI or scripts)
//!
//! This module provides a REST API for the live session:
//! - POST /session/start - Connect and start streaming the microphone
//! - POST /session/stop - Tear the session down
//! - GET /session - Observable conversation state
//! - GET /session/messages - Finalized message log
//! - GET /session/stats - Session statistics
//! - GET /session/levels - Input/output audio levels
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
