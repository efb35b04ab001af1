//! The credential blob of a session.
//!
//! A [`Credentials`] value holds everything the protocol engine needs to
//! reconnect a device without pairing again: long-lived key pairs, the
//! registration id, and (after pairing) the signed-in identity.  The blob
//! is opaque to the session manager.  It is only ever replaced as a whole
//! by credential-update events, never patched field by field.
//!
//! Fresh credentials are generated on the first connect of a session that
//! has nothing persisted yet.  Random bytes come from v4 UUIDs, which are
//! backed by the operating system's CSPRNG.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::Identity;
use crate::protocol::codec::KeyBytes;

/// Length of curve25519 public and private keys.
pub const CURVE_KEY_LEN: usize = 32;

/// A public/private key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: KeyBytes,
    pub private: KeyBytes,
}

impl KeyPair {
    /// Generates a random key pair.
    ///
    /// The engine derives real curve points from the private half on first
    /// use; the session manager only needs the bytes to be unpredictable.
    pub fn generate() -> Self {
        Self {
            public: KeyBytes::new(random_bytes(CURVE_KEY_LEN)),
            private: KeyBytes::new(random_bytes(CURVE_KEY_LEN)),
        }
    }
}

/// A key pair signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedKeyPair {
    pub key_pair: KeyPair,
    pub signature: KeyBytes,
    pub key_id: u32,
}

/// Authentication material of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub noise_key: KeyPair,
    pub pairing_ephemeral_key_pair: KeyPair,
    pub signed_identity_key: KeyPair,
    pub signed_pre_key: SignedKeyPair,
    pub registration_id: u16,
    pub adv_secret_key: KeyBytes,
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    /// `true` once the device has completed pairing.
    #[serde(default)]
    pub registered: bool,
    /// Signed-in identity, populated by the engine after pairing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Engine-specific fields the session manager does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, KeyBytes>,
}

impl Credentials {
    /// Generates credentials for a session that has never paired.
    pub fn fresh() -> Self {
        let id_bytes = random_bytes(2);
        let registration_id = u16::from_be_bytes([id_bytes[0], id_bytes[1]]) & 0x3FFF;
        Self {
            noise_key: KeyPair::generate(),
            pairing_ephemeral_key_pair: KeyPair::generate(),
            signed_identity_key: KeyPair::generate(),
            signed_pre_key: SignedKeyPair {
                key_pair: KeyPair::generate(),
                signature: KeyBytes::new(random_bytes(64)),
                key_id: 1,
            },
            registration_id,
            adv_secret_key: KeyBytes::new(random_bytes(32)),
            next_pre_key_id: 1,
            first_unuploaded_pre_key_id: 1,
            registered: false,
            me: None,
            platform: None,
            additional: BTreeMap::new(),
        }
    }
}

/// Returns `len` random bytes drawn from v4 UUIDs.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let uuid = Uuid::new_v4();
        let remaining = len - out.len();
        let chunk = uuid.as_bytes();
        out.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_credentials_are_unregistered_and_anonymous() {
        let creds = Credentials::fresh();
        assert!(!creds.registered);
        assert!(creds.me.is_none());
        assert!(creds.registration_id <= 0x3FFF);
    }

    #[test]
    fn test_fresh_credentials_have_full_length_keys() {
        let creds = Credentials::fresh();
        assert!(creds.noise_key.public.expect_len(CURVE_KEY_LEN).is_ok());
        assert!(creds.noise_key.private.expect_len(CURVE_KEY_LEN).is_ok());
        assert_eq!(creds.signed_pre_key.signature.len(), 64);
    }

    #[test]
    fn test_two_fresh_credentials_differ() {
        assert_ne!(Credentials::fresh(), Credentials::fresh());
    }

    #[test]
    fn test_random_bytes_returns_requested_length() {
        for len in [0, 1, 15, 16, 17, 64] {
            assert_eq!(random_bytes(len).len(), len);
        }
    }

    #[test]
    fn test_credentials_json_uses_camel_case_and_text_keys() {
        let creds = Credentials::fresh();
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("\"noiseKey\""));
        assert!(json.contains("\"registrationId\""));
        // Optional identity is omitted before pairing.
        assert!(!json.contains("\"me\""));
    }
}
