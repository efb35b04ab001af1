//! Application layer: route handlers and the error-to-status mapping.

pub mod error;
pub mod handlers;

pub use error::ApiError;
pub use handlers::AppState;
