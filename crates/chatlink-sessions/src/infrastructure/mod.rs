//! Infrastructure layer: adapters behind the application traits.
//!
//! - `storage`   – credential stores (in-memory, JSON files) and the TOML
//!   gateway configuration.
//! - `engine`    – protocol engine adapters: a scripted engine driven by
//!   tests and an offline simulator for local runs.
//! - `qr_render` – renders pairing challenges as SVG data URLs and
//!   terminal text.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `chatlink_core`, but MUST NOT be imported by the `application` layer.

pub mod engine;
pub mod qr_render;
pub mod storage;
