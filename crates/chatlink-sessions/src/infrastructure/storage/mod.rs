//! Storage infrastructure: credential records and configuration files.
//!
//! - `memory` keeps records in a map; used by tests and throwaway runs.
//! - `file` writes one JSON document per session under a directory.
//! - `config` reads and writes the TOML gateway configuration.
//!
//! Binary key material is stored as base64 text in both credential stores
//! (see `chatlink_core::protocol::codec`).

pub mod config;
pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
