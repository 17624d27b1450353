use crate::block::output::Output;
use crate::block::payload::TransactionEssence;
use crate::block::{Address, OutputId};
use crate::error::{Error, Result};
use crate::node_api::responses::OutputMetadata;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// BIP-44 purpose.
pub const HD_WALLET_TYPE: u32 = 44;
/// SLIP-44 style coin type used by default.
pub const TRINITY_COIN_TYPE: u32 = 7331;

/// Hardened BIP-44 path `m/44'/coin'/account'/internal'/index'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub coin_type: u32,
    pub account_index: u32,
    pub internal: bool,
    pub address_index: u32,
}

impl Chain {
    pub fn new(coin_type: u32, account_index: u32, internal: bool, address_index: u32) -> Self {
        Self {
            coin_type,
            account_index,
            internal,
            address_index,
        }
    }

    pub fn derivation_path(&self) -> String {
        format!(
            "m/{}'/{}'/{}'/{}'/{}'",
            HD_WALLET_TYPE, self.coin_type, self.account_index, self.internal as u32, self.address_index
        )
    }

    /// The path as hardened u32 segments, as a device expects it.
    pub fn segments(&self) -> [u32; 5] {
        const HARDENED: u32 = 1 << 31;
        [
            HD_WALLET_TYPE | HARDENED,
            self.coin_type | HARDENED,
            self.account_index | HARDENED,
            self.internal as u32 | HARDENED,
            self.address_index | HARDENED,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAddressOptions {
    /// Show the address on the device before returning it.
    #[serde(default)]
    pub ledger_nano_prompt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAddressesOptions {
    #[serde(default = "default_coin_type")]
    pub coin_type: u32,
    #[serde(default)]
    pub account_index: u32,
    #[serde(default = "default_range")]
    pub range: Range<u32>,
    #[serde(default)]
    pub internal: bool,
    /// Falls back to the network's HRP.
    #[serde(default)]
    pub bech32_hrp: Option<String>,
    #[serde(default)]
    pub options: Option<GenerateAddressOptions>,
}

impl Default for GenerateAddressesOptions {
    fn default() -> Self {
        Self {
            coin_type: TRINITY_COIN_TYPE,
            account_index: 0,
            range: default_range(),
            internal: false,
            bech32_hrp: None,
            options: None,
        }
    }
}

fn default_coin_type() -> u32 {
    TRINITY_COIN_TYPE
}

fn default_range() -> Range<u32> {
    0..20
}

/// An input together with everything needed to sign it offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSigningData {
    pub output: Output,
    pub output_metadata: OutputMetadata,
    #[serde(default)]
    pub chain: Option<Chain>,
}

impl InputSigningData {
    pub fn output_id(&self) -> OutputId {
        self.output_metadata.output_id()
    }

    pub fn owning_address(&self) -> Result<Address> {
        self.output
            .owning_address()
            .copied()
            .ok_or_else(|| Error::InvalidOutput(format!("output {} has no owning address", self.output_id())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainderData {
    pub output: Output,
    #[serde(default)]
    pub chain: Option<Chain>,
    pub address: Address,
}

/// Unsigned transaction. Owned by the caller; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransactionData {
    pub essence: TransactionEssence,
    pub inputs_data: Vec<InputSigningData>,
    #[serde(default)]
    pub remainder: Option<RemainderData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerApp {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerNanoStatus {
    pub connected: bool,
    pub locked: bool,
    #[serde(default)]
    pub app: Option<LedgerApp>,
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_path() {
        let chain = Chain::new(TRINITY_COIN_TYPE, 1, true, 4);
        assert_eq!(chain.derivation_path(), "m/44'/7331'/1'/1'/4'");
        assert_eq!(chain.segments()[4], 4 | (1 << 31));
    }

    #[test]
    fn test_generate_options_defaults() {
        let options: GenerateAddressesOptions = serde_json::from_str(r#"{"range":{"start":0,"end":5}}"#).unwrap();
        assert_eq!(options.coin_type, TRINITY_COIN_TYPE);
        assert_eq!(options.range, 0..5);
        assert!(!options.internal);
    }
}
