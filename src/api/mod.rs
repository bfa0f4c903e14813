//! HTTP API: health, readiness and engine status.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
