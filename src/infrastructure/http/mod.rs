//! HTTP surface of the gate.
//!
//! | Route | Method | |
//! |-------|--------|-|
//! | `/health` | GET | liveness |
//! | `/metrics` | GET | limiter and relay counters |
//! | `/api/realtime/session` | POST | rate-limited session issuance |
//! | `/api/realtime/ws` | GET | WebSocket relay |

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use auth::{Authenticated, Principal, SharedSecret};
pub use error::{ApiError, ErrorBody};
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

/// Path of the session issuance endpoint.
pub const SESSION_PATH: &str = "/api/realtime/session";

/// Path of the WebSocket relay endpoint.
pub const RELAY_PATH: &str = "/api/realtime/ws";

/// Build the router serving every gate endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(SESSION_PATH, post(handlers::create_session))
        .route(RELAY_PATH, get(handlers::relay))
        .with_state(state)
}
