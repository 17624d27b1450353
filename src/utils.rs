//! Conversions and hashes that need no node

use crate::block::address::{Address, KEY_ADDRESS_KIND};
use crate::block::payload::{TransactionEssence, TransactionPayload};
use crate::block::{serde_hex, Block, BlockId, Sha256Hash, TransactionId};
use crate::crypto::public_key_from_hex;
use crate::error::{Error, Result};
use rand::RngCore;
use zeroize::Zeroizing;

/// Address bytes of a bech32 address, as `0x` hex.
pub fn bech32_to_hex(bech32: &str) -> Result<String> {
    let (_, address) = Address::try_from_bech32(bech32)?;
    Ok(address.to_hex())
}

/// Bech32 form of a key address given as 32 bytes of hex, or of any
/// address given as its kind byte followed by 32 bytes.
pub fn hex_to_bech32(hex: &str, bech32_hrp: &str) -> Result<String> {
    let bytes = serde_hex::decode(hex)?;
    let address = match bytes.len() {
        32 => Address::from_kind_and_bytes(KEY_ADDRESS_KIND, to_array(&bytes[..])?)?,
        33 => Address::from_kind_and_bytes(bytes[0], to_array(&bytes[1..])?)?,
        other => {
            return Err(Error::InvalidAddress(format!(
                "expected 32 or 33 address bytes, got {}",
                other
            )))
        }
    };
    address.to_bech32(bech32_hrp)
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len())))
}

/// Key address of a compressed secp256k1 public key given as hex.
pub fn hex_public_key_to_bech32_address(hex: &str, bech32_hrp: &str) -> Result<String> {
    let public_key = public_key_from_hex(hex)?;
    Address::from_public_key(&public_key).to_bech32(bech32_hrp)
}

pub fn parse_bech32_address(bech32: &str) -> Result<Address> {
    Ok(Address::try_from_bech32(bech32)?.1)
}

pub fn is_address_valid(bech32: &str) -> bool {
    Address::is_valid_bech32(bech32)
}

/// A fresh 24 word English mnemonic.
pub fn generate_mnemonic() -> Result<String> {
    let mut entropy = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut entropy[..]);
    let mnemonic =
        bip39::Mnemonic::from_entropy(&entropy[..]).map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// BIP-39 seed of `mnemonic` as `0x` hex.
pub fn mnemonic_to_hex_seed(mnemonic: &str) -> Result<String> {
    let seed = crate::secret::mnemonic::mnemonic_to_seed(mnemonic)?;
    Ok(serde_hex::encode(&seed[..]))
}

pub fn block_id(block: &Block) -> Result<BlockId> {
    block.id()
}

pub fn transaction_id(payload: &TransactionPayload) -> Result<TransactionId> {
    payload.id()
}

pub fn hash_transaction_essence(essence: &TransactionEssence) -> Result<Sha256Hash> {
    essence.hash()
}
