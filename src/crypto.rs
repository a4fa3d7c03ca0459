//! Transparent AES encryption of serialized collection payloads.
//!
//! Five algorithm variants are supported, keyed by hex strings whose length
//! is fixed per algorithm. Every call generates a fresh random IV and emits
//! a colon-delimited hex envelope: `iv:ciphertext` for the CBC modes,
//! `iv:ciphertext:tag` for the authenticated GCM modes. Encryption owns the
//! serialize step: values are rendered to compact JSON before encrypting,
//! so the codec is bypassed entirely when encryption is active.

use crate::error::{Result, StoreError};
use crate::types::Value;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// CBC initialization vector size in bytes.
const CBC_IV_LEN: usize = 16;

/// GCM nonce size in bytes.
const GCM_NONCE_LEN: usize = 12;

/// GCM authentication tag size in bytes.
const GCM_TAG_LEN: usize = 16;

/// Supported encryption algorithms, distinguished by key length and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
}

impl Algorithm {
    /// Required key length in hex characters (two per key byte).
    pub fn key_hex_len(self) -> usize {
        match self {
            Algorithm::Aes128Cbc | Algorithm::Aes128Gcm => 32,
            Algorithm::Aes192Cbc => 48,
            Algorithm::Aes256Cbc | Algorithm::Aes256Gcm => 64,
        }
    }

    /// Whether the mode carries an authentication tag segment.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Algorithm::Aes128Gcm | Algorithm::Aes256Gcm)
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Aes128Cbc => "aes-128-cbc",
            Algorithm::Aes192Cbc => "aes-192-cbc",
            Algorithm::Aes256Cbc => "aes-256-cbc",
            Algorithm::Aes128Gcm => "aes-128-gcm",
            Algorithm::Aes256Gcm => "aes-256-gcm",
        }
    }

    pub fn from_name(name: &str) -> Option<Algorithm> {
        match name {
            "aes-128-cbc" => Some(Algorithm::Aes128Cbc),
            "aes-192-cbc" => Some(Algorithm::Aes192Cbc),
            "aes-256-cbc" => Some(Algorithm::Aes256Cbc),
            "aes-128-gcm" => Some(Algorithm::Aes128Gcm),
            "aes-256-gcm" => Some(Algorithm::Aes256Gcm),
            _ => None,
        }
    }

    /// Check a hex key against this algorithm's length table.
    pub fn validate_key(self, hex_key: &str) -> Result<()> {
        if hex_key.len() != self.key_hex_len() {
            return Err(StoreError::Validation(format!(
                "{} requires a {}-character hex key ({} bytes)",
                self.name(),
                self.key_hex_len(),
                self.key_hex_len() / 2
            )));
        }
        hex::decode(hex_key).map_err(|e| {
            StoreError::Validation(format!("encryption key is not valid hex: {}", e))
        })?;
        Ok(())
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn key_bytes(algorithm: Algorithm, hex_key: &str) -> Result<Vec<u8>> {
    algorithm.validate_key(hex_key)?;
    hex::decode(hex_key)
        .map_err(|e| StoreError::Encryption(format!("invalid hex key: {}", e)))
}

/// Serialize `value` to compact JSON and encrypt it.
///
/// Returns the `iv:ciphertext[:tag]` hex envelope.
pub fn encrypt(value: &Value, algorithm: Algorithm, hex_key: &str) -> Result<String> {
    let key = key_bytes(algorithm, hex_key)?;
    let plaintext = serde_json::to_vec(&value.to_json())?;

    match algorithm {
        Algorithm::Aes128Cbc | Algorithm::Aes192Cbc | Algorithm::Aes256Cbc => {
            let mut iv = [0u8; CBC_IV_LEN];
            OsRng.fill_bytes(&mut iv);
            let ciphertext = match algorithm {
                Algorithm::Aes128Cbc => Aes128CbcEnc::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .encrypt_padded_vec_mut::<Pkcs7>(&plaintext),
                Algorithm::Aes192Cbc => Aes192CbcEnc::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .encrypt_padded_vec_mut::<Pkcs7>(&plaintext),
                _ => Aes256CbcEnc::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .encrypt_padded_vec_mut::<Pkcs7>(&plaintext),
            };
            Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
        }
        Algorithm::Aes128Gcm | Algorithm::Aes256Gcm => {
            let mut nonce = [0u8; GCM_NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            let sealed = match algorithm {
                Algorithm::Aes128Gcm => Aes128Gcm::new_from_slice(&key)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice()),
                _ => Aes256Gcm::new_from_slice(&key)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice()),
            }
            .map_err(|_| StoreError::Encryption("encryption failed".to_string()))?;

            // The AEAD output carries the tag in its last 16 bytes; the
            // envelope keeps it as a separate segment.
            let split = sealed.len() - GCM_TAG_LEN;
            Ok(format!(
                "{}:{}:{}",
                hex::encode(nonce),
                hex::encode(&sealed[..split]),
                hex::encode(&sealed[split..])
            ))
        }
    }
}

/// Decrypt an `iv:ciphertext[:tag]` envelope back into its value.
///
/// Authenticated modes reject a missing tag segment and any authentication
/// failure; there is no silent acceptance of tampered ciphertext.
pub fn decrypt(envelope: &str, algorithm: Algorithm, hex_key: &str) -> Result<Value> {
    let key = key_bytes(algorithm, hex_key)?;
    let parts: Vec<&str> = envelope.trim().split(':').collect();
    if parts.len() < 2 {
        return Err(StoreError::Encryption(
            "malformed encrypted envelope".to_string(),
        ));
    }

    let iv = hex::decode(parts[0])
        .map_err(|_| StoreError::Encryption("invalid IV segment".to_string()))?;
    let ciphertext = hex::decode(parts[1])
        .map_err(|_| StoreError::Encryption("invalid ciphertext segment".to_string()))?;

    let plaintext = match algorithm {
        Algorithm::Aes128Cbc | Algorithm::Aes192Cbc | Algorithm::Aes256Cbc => {
            let decrypted = match algorithm {
                Algorithm::Aes128Cbc => Aes128CbcDec::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                Algorithm::Aes192Cbc => Aes192CbcDec::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                _ => Aes256CbcDec::new_from_slices(&key, &iv)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
            };
            decrypted.map_err(|_| {
                StoreError::Encryption("decryption failed: wrong key or corrupted data".to_string())
            })?
        }
        Algorithm::Aes128Gcm | Algorithm::Aes256Gcm => {
            let tag_hex = parts.get(2).ok_or_else(|| {
                StoreError::Encryption(format!(
                    "{} requires an authentication tag segment",
                    algorithm.name()
                ))
            })?;
            let tag = hex::decode(tag_hex)
                .map_err(|_| StoreError::Encryption("invalid tag segment".to_string()))?;
            if iv.len() != GCM_NONCE_LEN {
                return Err(StoreError::Encryption(
                    "invalid nonce length".to_string(),
                ));
            }

            let mut sealed = ciphertext;
            sealed.extend_from_slice(&tag);

            match algorithm {
                Algorithm::Aes128Gcm => Aes128Gcm::new_from_slice(&key)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .decrypt(Nonce::from_slice(&iv), sealed.as_slice()),
                _ => Aes256Gcm::new_from_slice(&key)
                    .map_err(|e| StoreError::Encryption(e.to_string()))?
                    .decrypt(Nonce::from_slice(&iv), sealed.as_slice()),
            }
            .map_err(|_| {
                StoreError::Encryption(
                    "decryption failed: wrong key or tampered ciphertext".to_string(),
                )
            })?
        }
    };

    let json: serde_json::Value = serde_json::from_slice(&plaintext).map_err(|_| {
        StoreError::Encryption("decrypted payload is not a valid document".to_string())
    })?;
    Ok(Value::from_json(json))
}

/// Generate a random hex key of `len_bytes` bytes (twice as many hex chars).
pub fn generate_key(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    const ALGORITHMS: [Algorithm; 5] = [
        Algorithm::Aes128Cbc,
        Algorithm::Aes192Cbc,
        Algorithm::Aes256Cbc,
        Algorithm::Aes128Gcm,
        Algorithm::Aes256Gcm,
    ];

    fn sample() -> Value {
        Value::from(doc! {
            "name" => "Ada",
            "age" => 36,
            "tags" => vec![Value::from("x"), Value::from(1)],
        })
    }

    #[test]
    fn round_trip_all_algorithms() {
        for algorithm in ALGORITHMS {
            let key = generate_key(algorithm.key_hex_len() / 2);
            let envelope = encrypt(&sample(), algorithm, &key).unwrap();
            let back = decrypt(&envelope, algorithm, &key).unwrap();
            assert_eq!(back, sample(), "{} did not round-trip", algorithm);
        }
    }

    #[test]
    fn envelope_segments_match_mode() {
        for algorithm in ALGORITHMS {
            let key = generate_key(algorithm.key_hex_len() / 2);
            let envelope = encrypt(&sample(), algorithm, &key).unwrap();
            let segments = envelope.split(':').count();
            if algorithm.is_authenticated() {
                assert_eq!(segments, 3, "{} should carry a tag", algorithm);
            } else {
                assert_eq!(segments, 2, "{} should not carry a tag", algorithm);
            }
        }
    }

    #[test]
    fn fresh_iv_per_call() {
        let key = generate_key(16);
        let a = encrypt(&sample(), Algorithm::Aes128Cbc, &key).unwrap();
        let b = encrypt(&sample(), Algorithm::Aes128Cbc, &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_is_an_error_not_empty_data() {
        let key = generate_key(32);
        let other = generate_key(32);
        let envelope = encrypt(&sample(), Algorithm::Aes256Gcm, &key).unwrap();
        let result = decrypt(&envelope, Algorithm::Aes256Gcm, &other);
        assert!(matches!(result, Err(StoreError::Encryption(_))));
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let key = generate_key(32);
        let envelope = encrypt(&sample(), Algorithm::Aes256Gcm, &key).unwrap();
        let mut parts: Vec<String> = envelope.split(':').map(String::from).collect();
        // Flip a nibble in the ciphertext segment.
        let flipped = if parts[1].as_bytes()[0] == b'0' { "1" } else { "0" };
        parts[1].replace_range(0..1, flipped);
        let result = decrypt(&parts.join(":"), Algorithm::Aes256Gcm, &key);
        assert!(matches!(result, Err(StoreError::Encryption(_))));
    }

    #[test]
    fn missing_tag_rejected_for_gcm() {
        let key = generate_key(16);
        let envelope = encrypt(&sample(), Algorithm::Aes128Gcm, &key).unwrap();
        let without_tag = envelope.rsplit_once(':').unwrap().0;
        let result = decrypt(without_tag, Algorithm::Aes128Gcm, &key);
        assert!(matches!(result, Err(StoreError::Encryption(_))));
    }

    #[test]
    fn malformed_envelope_rejected() {
        let key = generate_key(16);
        let result = decrypt("not-an-envelope", Algorithm::Aes128Cbc, &key);
        assert!(matches!(result, Err(StoreError::Encryption(_))));
    }

    #[test]
    fn key_length_table_enforced() {
        for algorithm in ALGORITHMS {
            let short = generate_key(4);
            assert!(algorithm.validate_key(&short).is_err());
            let exact = generate_key(algorithm.key_hex_len() / 2);
            assert!(algorithm.validate_key(&exact).is_ok());
        }
    }

    #[test]
    fn non_hex_key_rejected() {
        let bad = "zz".repeat(16);
        assert!(Algorithm::Aes128Cbc.validate_key(&bad).is_err());
    }

    #[test]
    fn generate_key_length() {
        assert_eq!(generate_key(16).len(), 32);
        assert_eq!(generate_key(32).len(), 64);
    }
}
