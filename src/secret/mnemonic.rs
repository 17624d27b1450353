//! In-memory seed secret manager

use super::types::{Chain, GenerateAddressOptions};
use super::SecretManage;
use crate::block::payload::SignatureUnlock;
use crate::block::Address;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ops::Range;
use zeroize::Zeroizing;

/// Holds a BIP-39 seed. Child keys are derived per call and erased before
/// the call returns.
pub struct MnemonicSecretManager {
    seed: Zeroizing<Vec<u8>>,
}

impl core::fmt::Debug for MnemonicSecretManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("MnemonicSecretManager(<redacted>)")
    }
}

impl MnemonicSecretManager {
    pub fn try_from_mnemonic(mnemonic: &str) -> Result<Self> {
        let seed = mnemonic_to_seed(mnemonic)?;
        Ok(Self { seed })
    }

    /// Seed given as hex, 16 to 64 bytes.
    pub fn try_from_hex_seed(hex_seed: &str) -> Result<Self> {
        let seed = Zeroizing::new(crate::block::serde_hex::decode(hex_seed)?);
        if !(16..=64).contains(&seed.len()) {
            return Err(Error::InvalidHex(format!(
                "seed must be between 16 and 64 bytes, got {}",
                seed.len()
            )));
        }
        Ok(Self { seed })
    }

    pub(crate) fn from_seed(seed: Zeroizing<Vec<u8>>) -> Self {
        Self { seed }
    }

    pub(crate) fn derive(&self, chain: &Chain) -> Result<KeyPair> {
        derive_key_pair(&self.seed, chain)
    }
}

/// BIP-39 seed of `mnemonic` with an empty passphrase.
pub(crate) fn mnemonic_to_seed(mnemonic: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mnemonic = bip39::Mnemonic::parse_normalized(mnemonic.trim())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed("").to_vec()))
}

pub(crate) fn derive_key_pair(seed: &[u8], chain: &Chain) -> Result<KeyPair> {
    let path: bip32::DerivationPath = chain
        .derivation_path()
        .parse()
        .map_err(|e: bip32::Error| Error::Crypto(e.to_string()))?;
    let xprv = bip32::XPrv::derive_from_path(seed, &path).map_err(|e| Error::Crypto(e.to_string()))?;
    let secret = Zeroizing::new(xprv.to_bytes());
    KeyPair::from_secret_bytes(secret.as_slice())
}

pub(crate) fn addresses_from_seed(
    seed: &[u8],
    coin_type: u32,
    account_index: u32,
    range: Range<u32>,
    internal: bool,
) -> Result<Vec<Address>> {
    range
        .map(|index| {
            let chain = Chain::new(coin_type, account_index, internal, index);
            Ok(derive_key_pair(seed, &chain)?.address())
        })
        .collect()
}

pub(crate) fn sign_with_seed(seed: &[u8], message: &[u8], chain: &Chain) -> Result<SignatureUnlock> {
    Ok(derive_key_pair(seed, chain)?.sign(message))
}

#[async_trait]
impl SecretManage for MnemonicSecretManager {
    async fn generate_addresses(
        &self,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
        internal: bool,
        _options: Option<GenerateAddressOptions>,
    ) -> Result<Vec<Address>> {
        addresses_from_seed(&self.seed, coin_type, account_index, range, internal)
    }

    async fn sign(&self, message: &[u8], chain: &Chain) -> Result<SignatureUnlock> {
        sign_with_seed(&self.seed, message, chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::types::TRINITY_COIN_TYPE;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn test_addresses_are_deterministic() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let a = MnemonicSecretManager::try_from_mnemonic(MNEMONIC).unwrap();
            let b = MnemonicSecretManager::try_from_mnemonic(MNEMONIC).unwrap();
            let first = a.generate_addresses(TRINITY_COIN_TYPE, 0, 0..3, false, None).await.unwrap();
            let second = b.generate_addresses(TRINITY_COIN_TYPE, 0, 0..3, false, None).await.unwrap();
            assert_eq!(first, second);
            assert_eq!(first.len(), 3);
            assert_ne!(first[0], first[1]);

            let internal = a.generate_addresses(TRINITY_COIN_TYPE, 0, 0..1, true, None).await.unwrap();
            assert_ne!(internal[0], first[0]);
        })
        .await
        .expect("test_addresses_are_deterministic timed out");
    }

    #[tokio::test]
    async fn test_signature_matches_address() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let manager = MnemonicSecretManager::try_from_mnemonic(MNEMONIC).unwrap();
            let chain = Chain::new(TRINITY_COIN_TYPE, 0, false, 2);
            let unlock = manager.sign(b"essence hash", &chain).await.unwrap();
            crate::crypto::verify_unlock(&unlock, b"essence hash").unwrap();

            let public_key = secp256k1::PublicKey::from_slice(&unlock.public_key).unwrap();
            let addresses = manager.generate_addresses(TRINITY_COIN_TYPE, 0, 2..3, false, None).await.unwrap();
            assert_eq!(Address::from_public_key(&public_key), addresses[0]);
        })
        .await
        .expect("test_signature_matches_address timed out");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            MnemonicSecretManager::try_from_mnemonic("not a mnemonic"),
            Err(Error::InvalidMnemonic(_))
        ));
        assert!(MnemonicSecretManager::try_from_hex_seed("0x1234").is_err());
        assert!(MnemonicSecretManager::try_from_hex_seed(&format!("0x{}", "ab".repeat(32))).is_ok());
    }
}
