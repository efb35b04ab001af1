//! Domain layer of the HTTP surface: wire bodies and server settings.

pub mod config;
pub mod messages;

pub use config::HttpConfig;
