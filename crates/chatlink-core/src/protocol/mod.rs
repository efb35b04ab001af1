//! Protocol-engine facing types: raw events and the key-material codec.

pub mod codec;
pub mod events;

pub use codec::{decode_bytes, encode_bytes, CodecError, KeyBytes};
pub use events::*;
