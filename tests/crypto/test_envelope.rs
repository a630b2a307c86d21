//! Envelope encryption properties
//!
//! Round trip, tamper detection, key mismatch and freshness guarantees for
//! the hybrid RSA-OAEP + AES-256-GCM envelope.

use aithena_relay_node::crypto::{decrypt_from, encrypt_for, CryptoError, Envelope, ServerKeys};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[test]
fn test_roundtrip_various_plaintexts() {
    let keys = ServerKeys::generate().unwrap();

    let plaintexts: Vec<String> = vec![
        "ping".to_string(),
        String::new() + "unicode: héllo wörld 你好 🔒",
        "x".repeat(1), // single byte
        "long ".repeat(2000), // well past the RSA modulus size
    ];

    for plaintext in plaintexts {
        let envelope = encrypt_for(plaintext.as_bytes(), keys.public_key()).unwrap();
        let decrypted = decrypt_from(&envelope, keys.private_key()).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}

#[test]
fn test_bit_flip_in_ciphertext_detected() {
    let keys = ServerKeys::generate().unwrap();
    let envelope = encrypt_for(b"tamper target", keys.public_key()).unwrap();

    let ciphertext = BASE64.decode(&envelope.encrypted_content).unwrap();
    for byte_index in 0..ciphertext.len() {
        let mut tampered = ciphertext.clone();
        tampered[byte_index] ^= 0x80;
        let tampered_envelope = Envelope {
            encrypted_content: BASE64.encode(&tampered),
            ..envelope.clone()
        };
        let result = decrypt_from(&tampered_envelope, keys.private_key());
        assert!(
            matches!(result, Err(CryptoError::Decryption)),
            "flip at byte {} must fail closed",
            byte_index
        );
    }
}

#[test]
fn test_bit_flip_in_tag_detected() {
    let keys = ServerKeys::generate().unwrap();
    let envelope = encrypt_for(b"tamper target", keys.public_key()).unwrap();

    let tag = BASE64.decode(&envelope.tag).unwrap();
    for byte_index in 0..tag.len() {
        let mut tampered = tag.clone();
        tampered[byte_index] ^= 0x01;
        let tampered_envelope = Envelope {
            tag: BASE64.encode(&tampered),
            ..envelope.clone()
        };
        assert!(
            decrypt_from(&tampered_envelope, keys.private_key()).is_err(),
            "flip at tag byte {} must fail closed",
            byte_index
        );
    }
}

#[test]
fn test_wrong_private_key_always_fails() {
    let sender_target = ServerKeys::generate().unwrap();
    let other = ServerKeys::generate().unwrap();

    let envelope = encrypt_for(b"addressed elsewhere", sender_target.public_key()).unwrap();
    let result = decrypt_from(&envelope, other.private_key());
    assert!(matches!(result, Err(CryptoError::Decryption)));
}

#[test]
fn test_two_encryptions_never_share_iv_or_wrapped_key() {
    let keys = ServerKeys::generate().unwrap();
    let a = encrypt_for(b"identical plaintext", keys.public_key()).unwrap();
    let b = encrypt_for(b"identical plaintext", keys.public_key()).unwrap();

    assert_ne!(a.iv, b.iv, "IV must be fresh per envelope");
    assert_ne!(
        a.encrypted_key, b.encrypted_key,
        "wrapped key must be fresh per envelope"
    );
}

#[test]
fn test_failure_causes_are_indistinguishable() {
    // Wrong key, corrupt base64 and tag mismatch must all produce the same
    // non-specific error message (no decryption oracle).
    let keys = ServerKeys::generate().unwrap();
    let other = ServerKeys::generate().unwrap();
    let envelope = encrypt_for(b"payload", keys.public_key()).unwrap();

    let wrong_key = decrypt_from(&envelope, other.private_key()).unwrap_err();

    let mut corrupt = envelope.clone();
    corrupt.iv = "!!!not base64!!!".to_string();
    let bad_base64 = decrypt_from(&corrupt, keys.private_key()).unwrap_err();

    let mut tampered = envelope.clone();
    let mut tag = BASE64.decode(&tampered.tag).unwrap();
    tag[0] ^= 0xff;
    tampered.tag = BASE64.encode(&tag);
    let bad_tag = decrypt_from(&tampered, keys.private_key()).unwrap_err();

    assert_eq!(wrong_key.to_string(), bad_base64.to_string());
    assert_eq!(bad_base64.to_string(), bad_tag.to_string());
}

#[test]
fn test_end_to_end_key_exchange_scenario() {
    // Client uploads public key K_c; server encrypts "ping" for K_c; client
    // decrypts with K_c's private half and recovers exactly "ping".
    let client = ServerKeys::generate().unwrap();
    let client_pem = client.public_key_pem().unwrap();

    let uploaded = aithena_relay_node::crypto::KeyMaterial::from_public_pem(&client_pem).unwrap();
    let envelope = encrypt_for(b"ping", uploaded.public_key()).unwrap();

    let recovered = decrypt_from(&envelope, client.private_key()).unwrap();
    assert_eq!(recovered, "ping");
}
