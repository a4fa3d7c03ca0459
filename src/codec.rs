//! Serialization between in-memory payloads and collection file bytes.
//!
//! Two formats: structured text (JSON, indentation controlled by the
//! configured tabspace) and a compact binary envelope. The binary form wraps
//! the payload under a single named field so non-array roots are handled
//! uniformly, and frames it with a little-endian u32 length prefix. A
//! payload too large for the length prefix fails with the distinguishable
//! [`StoreError::Oversized`] so the store can fall back to chunking.

use crate::config::{Config, Encoding};
use crate::error::{Result, StoreError};
use crate::types::Value;
use serde::{Deserialize, Serialize};

const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    db: &'a Value,
}

#[derive(Deserialize)]
struct Envelope {
    db: Value,
}

/// Encode a payload for on-disk storage under the configured format.
pub fn encode(value: &Value, config: &Config) -> Result<Vec<u8>> {
    match config.encoding {
        Encoding::Json => encode_json(value, config.tabspace),
        Encoding::Binary => encode_binary(value),
    }
}

/// Decode collection file bytes back into a payload.
pub fn decode(bytes: &[u8], config: &Config) -> Result<Value> {
    match config.encoding {
        Encoding::Json => {
            let json: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| StoreError::Decode(format!("invalid json payload: {}", e)))?;
            Ok(Value::from_json(json))
        }
        Encoding::Binary => decode_binary(bytes),
    }
}

fn encode_json(value: &Value, tabspace: usize) -> Result<Vec<u8>> {
    let json = value.to_json();
    if tabspace == 0 {
        return Ok(serde_json::to_vec(&json)?);
    }
    let indent = " ".repeat(tabspace);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)?;
    Ok(out)
}

fn encode_binary(value: &Value) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&EnvelopeRef { db: value })?;
    if payload.len() as u64 > u32::MAX as u64 {
        return Err(StoreError::Oversized);
    }
    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode_binary(bytes: &[u8]) -> Result<Value> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(StoreError::Decode(
            "binary payload shorter than its length prefix".to_string(),
        ));
    }
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&bytes[..LENGTH_PREFIX_LEN]);
    let declared = u32::from_le_bytes(prefix) as usize;
    let body = &bytes[LENGTH_PREFIX_LEN..];
    if body.len() != declared {
        return Err(StoreError::Decode(format!(
            "binary payload length mismatch: prefix says {} bytes, found {}",
            declared,
            body.len()
        )));
    }
    let envelope: Envelope = bincode::deserialize(body)
        .map_err(|e| StoreError::Decode(format!("invalid binary payload: {}", e)))?;
    Ok(envelope.db)
}

/// Serialized size of a payload under the binary format, without encoding it.
pub fn binary_size(value: &Value) -> Result<u64> {
    let body = bincode::serialized_size(&EnvelopeRef { db: value })?;
    Ok(body + LENGTH_PREFIX_LEN as u64)
}

/// Serialized size of one array item under the binary format. Used by the
/// chunk packer to budget items against the file ceiling.
pub fn binary_item_size(value: &Value) -> Result<u64> {
    Ok(bincode::serialized_size(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::types::Document;
    use uuid::Uuid;

    fn sample() -> Value {
        Value::Array(vec![
            Value::from(doc! { "name" => "Ada", "age" => 36 }),
            Value::from(doc! { "name" => "Brian", "scores" => vec![Value::Int(1), Value::Int(2)] }),
        ])
    }

    #[test]
    fn json_round_trip() {
        let config = Config::default();
        let bytes = encode(&sample(), &config).unwrap();
        assert_eq!(decode(&bytes, &config).unwrap(), sample());
    }

    #[test]
    fn json_indentation_follows_tabspace() {
        let compact = Config {
            tabspace: 0,
            ..Config::default()
        };
        let pretty = Config::default();
        let compact_bytes = encode(&sample(), &compact).unwrap();
        let pretty_bytes = encode(&sample(), &pretty).unwrap();
        assert!(!compact_bytes.contains(&b'\n'));
        assert!(pretty_bytes.contains(&b'\n'));
        assert_eq!(decode(&pretty_bytes, &pretty).unwrap(), sample());
    }

    #[test]
    fn binary_round_trip() {
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        let bytes = encode(&sample(), &config).unwrap();
        assert_eq!(decode(&bytes, &config).unwrap(), sample());
    }

    #[test]
    fn binary_round_trip_non_array_root() {
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        let payload = Value::from(doc! { "kind" => "metadata", "version" => 2 });
        let bytes = encode(&payload, &config).unwrap();
        assert_eq!(decode(&bytes, &config).unwrap(), payload);
    }

    #[test]
    fn binary_preserves_id_values() {
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        let id = Uuid::new_v4();
        let mut doc = Document::new();
        doc.insert("_id".to_string(), Value::Id(id));
        let bytes = encode(&Value::from(doc), &config).unwrap();
        let decoded = decode(&bytes, &config).unwrap();
        let Value::Object(map) = decoded else {
            panic!("expected object");
        };
        assert_eq!(map.get("_id"), Some(&Value::Id(id)));
    }

    #[test]
    fn truncated_binary_payload_is_a_decode_error() {
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        let mut bytes = encode(&sample(), &config).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            decode(&bytes, &config),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn garbage_is_a_decode_error_in_both_modes() {
        let json = Config::default();
        let binary = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        assert!(matches!(
            decode(b"not a payload", &json),
            Err(StoreError::Decode(_))
        ));
        assert!(matches!(
            decode(b"no", &binary),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn binary_size_matches_encoded_length() {
        let estimated = binary_size(&sample()).unwrap();
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        let actual = encode(&sample(), &config).unwrap().len() as u64;
        assert_eq!(estimated, actual);
    }
}
