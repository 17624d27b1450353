//! Blocks and the identifiers that reference them
//!
//! A block commits to one to eight parent blocks, an optional payload and a
//! proof-of-work nonce. Identifiers are SHA-256 digests of the bincode
//! encoding; JSON renders them as `0x`-prefixed hex.

pub mod address;
pub mod output;
pub mod payload;
pub mod serde_hex;

use crate::error::{Error, Result};
use payload::Payload;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use address::Address;
pub use output::{Output, OutputId};
pub use payload::{TransactionEssence, TransactionPayload, UtxoInput};

pub type Sha256Hash = [u8; 32];

pub const PROTOCOL_VERSION: u8 = 2;
pub const MIN_PARENTS: usize = 1;
pub const MAX_PARENTS: usize = 8;
/// Maximum encoded block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 32_768;

macro_rules! impl_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const LENGTH: usize = 32;

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn null() -> Self {
                Self([0; 32])
            }

            pub fn is_null(&self) -> bool {
                self.0 == [0; 32]
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl core::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ok(Self(serde_hex::decode_array(s)?))
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serde_hex::fixed::serialize(&self.0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                serde_hex::fixed::deserialize(deserializer).map(Self)
            }
        }
    };
}

impl_id!(
    /// Identifier of a block, the digest of its full encoding.
    BlockId
);
impl_id!(
    /// Identifier of a transaction payload.
    TransactionId
);
impl_id!(
    /// Identifier of an alias output chain.
    AliasId
);
impl_id!(
    /// Identifier of an NFT output chain.
    NftId
);
impl_id!(
    /// Identifier of a milestone payload.
    MilestoneId
);

pub(crate) fn sha256(bytes: impl AsRef<[u8]>) -> Sha256Hash {
    Sha256::digest(bytes.as_ref()).into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub protocol_version: u8,
    pub parents: Vec<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(with = "serde_hex::string_u64")]
    pub nonce: u64,
}

impl Block {
    /// Creates an unmined block. Parents are sorted and deduplicated.
    pub fn new(mut parents: Vec<BlockId>, payload: Option<Payload>) -> Self {
        parents.sort();
        parents.dedup();
        Block {
            protocol_version: PROTOCOL_VERSION,
            parents,
            payload,
            nonce: 0,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn id(&self) -> Result<BlockId> {
        Ok(BlockId(sha256(bincode::serialize(self)?)))
    }

    /// Digest over everything but the nonce; the miner searches nonces
    /// against this fixed value.
    pub fn pow_digest(&self) -> Result<Sha256Hash> {
        let mut hasher = Sha256::new();
        hasher.update([self.protocol_version]);
        for parent in &self.parents {
            hasher.update(parent.0);
        }
        if let Some(payload) = &self.payload {
            hasher.update(bincode::serialize(payload)?);
        }
        Ok(hasher.finalize().into())
    }

    pub fn pow_score(&self) -> Result<u32> {
        Ok(crate::pow::score(&self.pow_digest()?, self.nonce))
    }

    pub fn transaction(&self) -> Option<&TransactionPayload> {
        match &self.payload {
            Some(Payload::Transaction(tx)) => Some(tx),
            _ => None,
        }
    }

    /// Structural checks that need no network access.
    pub fn validate_syntax(&self) -> Result<()> {
        if !(MIN_PARENTS..=MAX_PARENTS).contains(&self.parents.len()) {
            return Err(Error::InvalidBlock(format!(
                "block needs between {} and {} parents, got {}",
                MIN_PARENTS,
                MAX_PARENTS,
                self.parents.len()
            )));
        }
        if self.parents.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidBlock(
                "parents must be sorted and unique".to_string(),
            ));
        }
        let size = bincode::serialized_size(self)? as usize;
        if size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidBlock(format!(
                "block too large: {} bytes (max: {})",
                size, MAX_BLOCK_SIZE
            )));
        }
        if let Some(Payload::Transaction(tx)) = &self.payload {
            tx.essence.validate_syntax()?;
        }
        Ok(())
    }
}
