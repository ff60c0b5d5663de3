//! HTTP API of the structure store

pub mod handlers;
pub mod routes;

pub use handlers::{AppError, ServerState, StoreState};
pub use routes::create_router;
