//! Binary-to-text codec for key material.
//!
//! Credentials are persisted through text formats (JSON files, document
//! stores).  Raw key bytes are not valid text, so every binary field is
//! wrapped in [`KeyBytes`], which serializes as standard padded base64
//! (RFC 4648 §4) and decodes symmetrically.  Losing a single bit here
//! means a session can no longer reconnect, so the codec is strict:
//! anything that is not canonical base64 is rejected rather than repaired.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while decoding persisted key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid base64 key material: {0}")]
    InvalidBase64(String),
    #[error("expected {expected} key bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },
}

/// Encodes bytes as standard padded base64.
pub fn encode_bytes(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes standard padded base64.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase64`] for any non-canonical input.
pub fn decode_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// Opaque key material that round-trips through text serializers.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyBytes(Vec<u8>);

impl KeyBytes {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Checks the length of fixed-size keys (e.g. 32-byte curve keys).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidLength`] when the length differs.
    pub fn expect_len(&self, expected: usize) -> Result<&[u8], CodecError> {
        if self.0.len() == expected {
            Ok(&self.0)
        } else {
            Err(CodecError::InvalidLength {
                expected,
                found: self.0.len(),
            })
        }
    }
}

impl From<Vec<u8>> for KeyBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for KeyBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

// Key material must never end up in logs verbatim.
impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyBytes({} bytes)", self.0.len())
    }
}

impl Serialize for KeyBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_bytes(&self.0))
    }
}

impl<'de> Deserialize<'de> for KeyBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyBytesVisitor;

        impl Visitor<'_> for KeyBytesVisitor {
            type Value = KeyBytes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base64-encoded string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<KeyBytes, E> {
                decode_bytes(v).map(KeyBytes).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(KeyBytesVisitor)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
