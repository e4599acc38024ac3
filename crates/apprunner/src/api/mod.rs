//! Admin HTTP API.
//!
//! Operator-facing endpoints for launching and stopping applications,
//! publishing pages and emitting server events. Embedded pages never talk to
//! this API; they use the gRPC contract.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
