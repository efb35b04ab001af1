//! Integration tests for credential persistence through text.
//!
//! Credentials leave memory only as JSON text.  These tests push arbitrary
//! binary key material through that path and check that nothing is lost.

use std::collections::BTreeMap;

use chatlink_core::{Credentials, Identity, KeyBytes, KeyPair};

fn roundtrip(creds: &Credentials) -> Credentials {
    let text = serde_json::to_string(creds).expect("serialize must succeed");
    serde_json::from_str(&text).expect("deserialize must succeed")
}

#[test]
fn test_roundtrip_fresh_credentials() {
    let original = Credentials::fresh();
    assert_eq!(original, roundtrip(&original));
}

#[test]
fn test_roundtrip_registered_credentials_with_identity() {
    let mut original = Credentials::fresh();
    original.registered = true;
    original.me = Some(Identity {
        id: "5511999999999:3@s.whatsapp.net".to_string(),
        name: Some("Alice".to_string()),
        lid: Some("1234:3@lid".to_string()),
    });
    original.platform = Some("android".to_string());

    let restored = roundtrip(&original);

    assert_eq!(original, restored);
    assert_eq!(restored.me.unwrap().name.as_deref(), Some("Alice"));
}

#[test]
fn test_roundtrip_preserves_edge_case_key_bytes() {
    // Arrange: empty keys, all-zero keys, all-0xFF keys and every byte value
    let mut original = Credentials::fresh();
    original.noise_key = KeyPair {
        public: KeyBytes::new(Vec::new()),
        private: KeyBytes::new(vec![0u8; 32]),
    };
    original.adv_secret_key = KeyBytes::new(vec![0xFF; 33]);
    let mut extra = BTreeMap::new();
    extra.insert("all".to_string(), KeyBytes::new((0..=255u8).collect::<Vec<_>>()));
    extra.insert("nul".to_string(), KeyBytes::new(vec![0]));
    original.additional = extra;

    // Act
    let restored = roundtrip(&original);

    // Assert
    assert_eq!(original, restored);
    assert_eq!(restored.additional["all"].len(), 256);
}

#[test]
fn test_roundtrip_is_stable_across_repeated_save_load_cycles() {
    let original = Credentials::fresh();
    let mut current = original.clone();
    for _ in 0..5 {
        current = roundtrip(&current);
    }
    assert_eq!(original, current);
}

#[test]
fn test_corrupted_key_field_fails_to_load() {
    let original = Credentials::fresh();
    let mut value = serde_json::to_value(&original).unwrap();
    value["advSecretKey"] = serde_json::Value::String("%%%".to_string());

    let result: Result<Credentials, _> = serde_json::from_value(value);

    assert!(result.is_err(), "corrupted key material must not load silently");
}
