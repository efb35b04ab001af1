//! Infrastructure layer: the axum router and TCP listener.

pub mod server;

pub use server::{router, run_server};
