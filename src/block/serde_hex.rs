//! Serde helpers: `0x`-prefixed hex in JSON, raw bytes in binary encodings.
//!
//! Every helper checks [`Serializer::is_human_readable`] so the same types
//! render as readable JSON for bindings and as compact bytes when hashed
//! through bincode.

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}

pub fn decode(s: &str) -> Result<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(stripped)?)
}

pub fn decode_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode(s)?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        Error::InvalidHex(format!("expected {} bytes, got {}", N, b.len()))
    })
}

/// Variable-length byte strings.
pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&encode(value))
        } else {
            serializer.serialize_bytes(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            decode(&s).map_err(D::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

/// Fixed-length arrays such as public keys and signatures.
pub mod fixed {
    use super::*;

    pub fn serialize<S: Serializer, const N: usize>(
        value: &[u8; N],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&encode(value))
        } else {
            serializer.serialize_bytes(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> std::result::Result<[u8; N], D::Error> {
        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            decode(&s).map_err(D::Error::custom)?
        } else {
            Vec::<u8>::deserialize(deserializer)?
        };
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| D::Error::custom(format!("expected {} bytes, got {}", N, b.len())))
    }
}

/// Token amounts travel as decimal strings in JSON so bindings without
/// 64-bit integers keep full precision.
pub mod string_u64 {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&value.to_string())
        } else {
            value.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
        if deserializer.is_human_readable() {
            match StringOrNumber::deserialize(deserializer)? {
                StringOrNumber::String(s) => s.parse().map_err(D::Error::custom),
                StringOrNumber::Number(n) => Ok(n),
            }
        } else {
            u64::deserialize(deserializer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "string_u64")]
        amount: u64,
        #[serde(with = "bytes")]
        data: Vec<u8>,
        #[serde(with = "fixed")]
        key: [u8; 4],
    }

    #[test]
    fn test_json_form_is_prefixed_hex() {
        let sample = Sample {
            amount: u64::MAX,
            data: vec![0xde, 0xad],
            key: [1, 2, 3, 4],
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["amount"], "18446744073709551615");
        assert_eq!(json["data"], "0xdead");
        assert_eq!(json["key"], "0x01020304");
        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_amount_accepts_plain_numbers() {
        let sample: Sample =
            serde_json::from_str(r#"{"amount": 42, "data": "", "key": "01020304"}"#).unwrap();
        assert_eq!(sample.amount, 42);
        assert!(sample.data.is_empty());
    }

    #[test]
    fn test_decode_array_rejects_wrong_length() {
        assert!(decode_array::<32>("0x00").is_err());
        assert!(decode_array::<1>("0x00").is_ok());
    }
}
