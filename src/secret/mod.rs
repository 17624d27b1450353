//! Secret managers
//!
//! Every signer implements [`SecretManage`]: address generation and signing
//! over a BIP-44 chain. Transaction signing is shared: the owning address of
//! each input is looked up among the addresses of the requested range, the
//! first input of an address gets a signature unlock and later inputs of the
//! same address reference it. Inputs owned by addresses outside the range
//! fail with `AddressNotFound`.
//!
//! Key material only exists inside a signing call, in zeroizing buffers.

pub mod ledger;
pub mod mnemonic;
pub mod types;
pub mod vault;

use crate::block::payload::{SignatureUnlock, TransactionPayload, Unlock};
use crate::block::{Address, Sha256Hash};
use crate::error::{Error, Result};
use async_trait::async_trait;
use ledger::LedgerSecretManager;
use mnemonic::MnemonicSecretManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use types::{Chain, GenerateAddressOptions, InputSigningData, LedgerNanoStatus, PreparedTransactionData};
use vault::VaultSecretManager;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[async_trait]
pub trait SecretManage: Send + Sync {
    async fn generate_addresses(
        &self,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
        internal: bool,
        options: Option<GenerateAddressOptions>,
    ) -> Result<Vec<Address>>;

    /// Signs SHA-256(`message`) with the key at `chain`.
    async fn sign(&self, message: &[u8], chain: &Chain) -> Result<SignatureUnlock>;

    async fn signature_unlock(&self, input: &InputSigningData, essence_hash: &Sha256Hash) -> Result<Unlock> {
        let chain = input.chain.as_ref().ok_or(Error::MissingParameter("chain"))?;
        Ok(Unlock::Signature(self.sign(essence_hash, chain).await?))
    }

    /// Signs every input of `prepared`, resolving owners over `range` of
    /// both the public and the internal branch.
    async fn sign_transaction(
        &self,
        prepared: &PreparedTransactionData,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
    ) -> Result<TransactionPayload> {
        let essence = &prepared.essence;
        if essence.inputs.len() != prepared.inputs_data.len()
            || essence
                .inputs
                .iter()
                .zip(&prepared.inputs_data)
                .any(|(input, data)| input.output_id() != data.output_id())
        {
            return Err(Error::InvalidTransaction(
                "inputs data does not match the essence inputs".to_string(),
            ));
        }

        let mut chains: HashMap<Address, Chain> = HashMap::new();
        for internal in [false, true] {
            let addresses = self
                .generate_addresses(coin_type, account_index, range.clone(), internal, None)
                .await?;
            for (index, address) in range.clone().zip(addresses) {
                chains
                    .entry(address)
                    .or_insert_with(|| Chain::new(coin_type, account_index, internal, index));
            }
        }

        let essence_hash = essence.hash()?;
        let mut owners = Vec::with_capacity(prepared.inputs_data.len());
        let mut signed_at: HashMap<Address, u16> = HashMap::new();
        let mut unlocks = Vec::with_capacity(prepared.inputs_data.len());
        for (index, input) in prepared.inputs_data.iter().enumerate() {
            let address = input.owning_address()?;
            owners.push(address);
            if let Some(reference) = signed_at.get(&address) {
                unlocks.push(Unlock::Reference {
                    reference: *reference,
                });
                continue;
            }
            let chain = chains.get(&address).ok_or_else(|| Error::AddressNotFound {
                address: address.to_hex(),
                range: format!("{:?}", range),
            })?;
            unlocks.push(Unlock::Signature(self.sign(&essence_hash, chain).await?));
            signed_at.insert(address, index as u16);
        }

        let payload = TransactionPayload {
            essence: essence.clone(),
            unlocks,
        };
        payload.verify_unlocks(&owners)?;
        Ok(payload)
    }
}

/// The closed set of signers.
#[derive(Debug)]
pub enum SecretManager {
    /// Mnemonic or raw seed held in memory.
    Mnemonic(MnemonicSecretManager),
    Stronghold(VaultSecretManager),
    LedgerNano(LedgerSecretManager),
}

impl SecretManager {
    pub fn try_from_mnemonic(mnemonic: &str) -> Result<Self> {
        Ok(Self::Mnemonic(MnemonicSecretManager::try_from_mnemonic(mnemonic)?))
    }

    pub fn try_from_hex_seed(seed: &str) -> Result<Self> {
        Ok(Self::Mnemonic(MnemonicSecretManager::try_from_hex_seed(seed)?))
    }

    pub async fn ledger_nano_status(&self) -> Result<LedgerNanoStatus> {
        match self {
            Self::LedgerNano(ledger) => Ok(ledger.get_ledger_nano_status().await),
            _ => Err(Error::Unsupported("ledger status")),
        }
    }

    pub fn store_mnemonic(&self, mnemonic: &str) -> Result<()> {
        match self {
            Self::Stronghold(vault) => vault.store_mnemonic(mnemonic),
            _ => Err(Error::Unsupported("storing a mnemonic")),
        }
    }

    fn as_manager(&self) -> &dyn SecretManage {
        match self {
            Self::Mnemonic(m) => m,
            Self::Stronghold(v) => v,
            Self::LedgerNano(l) => l,
        }
    }
}

#[async_trait]
impl SecretManage for SecretManager {
    async fn generate_addresses(
        &self,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
        internal: bool,
        options: Option<GenerateAddressOptions>,
    ) -> Result<Vec<Address>> {
        self.as_manager()
            .generate_addresses(coin_type, account_index, range, internal, options)
            .await
    }

    async fn sign(&self, message: &[u8], chain: &Chain) -> Result<SignatureUnlock> {
        self.as_manager().sign(message, chain).await
    }
}

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct VaultDto {
    pub snapshot_path: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Secret manager as sent by a binding. Never logged, never returned,
/// erased on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub enum SecretManagerDto {
    Mnemonic(String),
    #[serde(alias = "HexSeed")]
    Seed(String),
    Stronghold(VaultDto),
    /// `true` selects the simulator.
    LedgerNano(bool),
}

impl core::fmt::Debug for SecretManagerDto {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match self {
            Self::Mnemonic(_) => "Mnemonic",
            Self::Seed(_) => "Seed",
            Self::Stronghold(_) => "Stronghold",
            Self::LedgerNano(_) => "LedgerNano",
        };
        write!(f, "SecretManagerDto::{}(<redacted>)", kind)
    }
}

impl TryFrom<&SecretManagerDto> for SecretManager {
    type Error = Error;

    fn try_from(dto: &SecretManagerDto) -> Result<Self> {
        Ok(match dto {
            SecretManagerDto::Mnemonic(mnemonic) => Self::try_from_mnemonic(mnemonic)?,
            SecretManagerDto::Seed(seed) => Self::try_from_hex_seed(seed)?,
            SecretManagerDto::Stronghold(vault) => Self::Stronghold(VaultSecretManager::new(
                &vault.snapshot_path,
                vault.password.clone(),
            )),
            SecretManagerDto::LedgerNano(is_simulator) => {
                Self::LedgerNano(LedgerSecretManager::new(*is_simulator))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_forms() {
        let dto: SecretManagerDto = serde_json::from_str(r#"{"HexSeed":"0x00"}"#).unwrap();
        assert!(matches!(dto, SecretManagerDto::Seed(_)));

        let dto: SecretManagerDto =
            serde_json::from_str(r#"{"Stronghold":{"snapshotPath":"a.vault","password":"pw"}}"#).unwrap();
        let debug = format!("{:?}", dto);
        assert!(!debug.contains("pw"));
        assert!(matches!(SecretManager::try_from(&dto), Ok(SecretManager::Stronghold(_))));

        let dto: SecretManagerDto = serde_json::from_str(r#"{"LedgerNano":true}"#).unwrap();
        assert!(matches!(
            SecretManager::try_from(&dto),
            Ok(SecretManager::LedgerNano(LedgerSecretManager { is_simulator: true, .. }))
        ));
    }

    #[test]
    fn test_mnemonic_dto_is_validated() {
        let dto = SecretManagerDto::Mnemonic("one two three".to_string());
        assert!(matches!(SecretManager::try_from(&dto), Err(Error::InvalidMnemonic(_))));
    }
}
