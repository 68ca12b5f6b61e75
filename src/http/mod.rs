//! HTTP API server for the kiosk UI
//!
//! The UI renders `GET /session` and posts button presses:
//! - POST /session/login - Start face identification
//! - POST /session/mic - Start or stop recording
//! - POST /session/text - Send a typed command
//! - POST /session/confirm - Answer a confirmation
//! - POST /session/sos/{request,confirm,cancel} - SOS dialog
//! - POST /session/stop - Emergency stop
//! - POST /session/language - Switch language
//! - POST /session/logout - Back to the login screen
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
