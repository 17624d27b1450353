//! Addresses and their bech32 representation

use crate::block::{serde_hex, AliasId, NftId};
use crate::error::{Error, Result};
use bech32::{FromBase32, ToBase32, Variant};
use secp256k1::PublicKey;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const KEY_ADDRESS_KIND: u8 = 0;
pub const ALIAS_ADDRESS_KIND: u8 = 8;
pub const NFT_ADDRESS_KIND: u8 = 16;

/// Owner of an output.
///
/// Key addresses are the SHA-256 hash of a compressed secp256k1 public key;
/// alias and NFT addresses reference an output chain by id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Key([u8; 32]),
    Alias(AliasId),
    Nft(NftId),
}

impl Address {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address::Key(crate::crypto::key_address_bytes(public_key))
    }

    pub fn kind(&self) -> u8 {
        match self {
            Address::Key(_) => KEY_ADDRESS_KIND,
            Address::Alias(_) => ALIAS_ADDRESS_KIND,
            Address::Nft(_) => NFT_ADDRESS_KIND,
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        match self {
            Address::Key(hash) => hash,
            Address::Alias(id) => id.as_bytes(),
            Address::Nft(id) => id.as_bytes(),
        }
    }

    pub fn from_kind_and_bytes(kind: u8, bytes: [u8; 32]) -> Result<Self> {
        match kind {
            KEY_ADDRESS_KIND => Ok(Address::Key(bytes)),
            ALIAS_ADDRESS_KIND => Ok(Address::Alias(AliasId(bytes))),
            NFT_ADDRESS_KIND => Ok(Address::Nft(NftId(bytes))),
            other => Err(Error::InvalidAddress(format!("unknown address kind {}", other))),
        }
    }

    /// `0x`-prefixed hex of the 32 address bytes, without the kind.
    pub fn to_hex(&self) -> String {
        serde_hex::encode(self.as_bytes())
    }

    pub fn to_bech32(&self, hrp: &str) -> Result<String> {
        let mut data = Vec::with_capacity(33);
        data.push(self.kind());
        data.extend_from_slice(self.as_bytes());
        bech32::encode(hrp, data.to_base32(), Variant::Bech32)
            .map_err(|e| Error::InvalidAddress(e.to_string()))
    }

    /// Decodes a bech32 address, returning its human-readable part too.
    pub fn try_from_bech32(bech32: &str) -> Result<(String, Self)> {
        let (hrp, data, variant) =
            bech32::decode(bech32).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        if variant != Variant::Bech32 {
            return Err(Error::InvalidAddress("expected bech32 variant".to_string()));
        }
        let bytes =
            Vec::<u8>::from_base32(&data).map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let (kind, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::InvalidAddress("empty address".to_string()))?;
        let payload: [u8; 32] = rest.try_into().map_err(|_| {
            Error::InvalidAddress(format!("expected 32 address bytes, got {}", rest.len()))
        })?;
        Ok((hrp, Self::from_kind_and_bytes(*kind, payload)?))
    }

    pub fn is_valid_bech32(bech32: &str) -> bool {
        Self::try_from_bech32(bech32).is_ok()
    }
}

impl core::fmt::Debug for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Address::Key(hash) => write!(f, "KeyAddress({})", serde_hex::encode(hash)),
            Address::Alias(id) => write!(f, "AliasAddress({})", id),
            Address::Nft(id) => write!(f, "NftAddress({})", id),
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Address", 2)?;
        state.serialize_field("type", &self.kind())?;
        match self {
            Address::Key(hash) => state.serialize_field("pubKeyHash", &HexField(hash))?,
            Address::Alias(id) => state.serialize_field("aliasId", id)?,
            Address::Nft(id) => state.serialize_field("nftId", id)?,
        }
        state.end()
    }
}

struct HexField<'a>(&'a [u8; 32]);

impl Serialize for HexField<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde_hex::fixed::serialize(self.0, serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressRepr {
    #[serde(rename = "type")]
    kind: u8,
    pub_key_hash: Option<String>,
    alias_id: Option<String>,
    nft_id: Option<String>,
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;
        let repr = AddressRepr::deserialize(deserializer)?;
        let hex = match repr.kind {
            KEY_ADDRESS_KIND => repr.pub_key_hash,
            ALIAS_ADDRESS_KIND => repr.alias_id,
            NFT_ADDRESS_KIND => repr.nft_id,
            other => return Err(D::Error::custom(format!("unknown address kind {}", other))),
        }
        .ok_or_else(|| D::Error::custom("address is missing its id field"))?;
        let bytes = serde_hex::decode_array(&hex).map_err(D::Error::custom)?;
        Address::from_kind_and_bytes(repr.kind, bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bech32_roundtrip_preserves_bytes() {
        let address = Address::Key([0x5a; 32]);
        let bech32 = address.to_bech32("tri").unwrap();
        assert!(bech32.starts_with("tri1"));
        let (hrp, decoded) = Address::try_from_bech32(&bech32).unwrap();
        assert_eq!(hrp, "tri");
        assert_eq!(decoded, address);
    }

    #[test]
    fn test_kinds_survive_bech32() {
        for address in [
            Address::Alias(AliasId([1; 32])),
            Address::Nft(NftId([2; 32])),
        ] {
            let (_, decoded) = Address::try_from_bech32(&address.to_bech32("tst").unwrap()).unwrap();
            assert_eq!(decoded.kind(), address.kind());
        }
    }

    #[test]
    fn test_invalid_bech32_detected() {
        assert!(!Address::is_valid_bech32("tri1invalid"));
        assert!(!Address::is_valid_bech32(""));
        let mut valid = Address::Key([1; 32]).to_bech32("tri").unwrap();
        valid.pop();
        valid.push('q');
        assert!(!Address::is_valid_bech32(&valid));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Address::Key([0; 32])).unwrap();
        assert_eq!(json["type"], 0);
        assert_eq!(json["pubKeyHash"], format!("0x{}", "00".repeat(32)));
        let back: Address = serde_json::from_value(json).unwrap();
        assert_eq!(back, Address::Key([0; 32]));

        let alias: Address =
            serde_json::from_str(&format!(r#"{{"type":8,"aliasId":"0x{}"}}"#, "11".repeat(32)))
                .unwrap();
        assert_eq!(alias, Address::Alias(AliasId([0x11; 32])));
    }
}
