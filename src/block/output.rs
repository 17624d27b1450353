//! Outputs, unlock conditions and features
//!
//! Unlock condition and feature tags are numeric on the wire:
//!
//! | unlock condition | tag | feature | tag |
//! |---|---|---|---|
//! | Address | 0 | Sender | 0 |
//! | StorageDepositReturn | 1 | Issuer | 1 |
//! | Timelock | 2 | Metadata | 2 |
//! | Expiration | 3 | Tag | 3 |
//! | StateControllerAddress | 4 | | |
//! | GovernorAddress | 5 | | |
//! | ImmutableAliasAddress | 6 | | |

use crate::block::address::Address;
use crate::block::{serde_hex, AliasId, NftId, TransactionId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_METADATA_LENGTH: usize = 8192;
pub const MAX_TAG_LENGTH: usize = 64;

/// Identifier of an output: the creating transaction and the output index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId {
    pub transaction_id: TransactionId,
    pub index: u16,
}

impl OutputId {
    pub const LENGTH: usize = 34;

    pub fn new(transaction_id: TransactionId, index: u16) -> Self {
        Self {
            transaction_id,
            index,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[..32].copy_from_slice(self.transaction_id.as_bytes());
        bytes[32..].copy_from_slice(&self.index.to_le_bytes());
        bytes
    }
}

impl core::fmt::Display for OutputId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", serde_hex::encode(self.to_bytes()))
    }
}

impl core::fmt::Debug for OutputId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OutputId({})", self)
    }
}

impl core::str::FromStr for OutputId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; Self::LENGTH] = serde_hex::decode_array(s)?;
        let mut tx = [0u8; 32];
        tx.copy_from_slice(&bytes[..32]);
        Ok(Self::new(
            TransactionId(tx),
            u16::from_le_bytes([bytes[32], bytes[33]]),
        ))
    }
}

impl Serialize for OutputId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde_hex::fixed::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for OutputId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;
        let bytes: [u8; Self::LENGTH] = serde_hex::fixed::deserialize(deserializer)?;
        serde_hex::encode(bytes).parse().map_err(D::Error::custom)
    }
}

// ===== Unlock conditions =====

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "UnlockConditionRepr", into = "UnlockConditionRepr")]
pub enum UnlockCondition {
    Address(Address),
    StorageDepositReturn { return_address: Address, amount: u64 },
    Timelock { unix_time: u32 },
    Expiration { return_address: Address, unix_time: u32 },
    StateControllerAddress(Address),
    GovernorAddress(Address),
    ImmutableAliasAddress(AliasId),
}

impl UnlockCondition {
    pub const ADDRESS: u8 = 0;
    pub const STORAGE_DEPOSIT_RETURN: u8 = 1;
    pub const TIMELOCK: u8 = 2;
    pub const EXPIRATION: u8 = 3;
    pub const STATE_CONTROLLER_ADDRESS: u8 = 4;
    pub const GOVERNOR_ADDRESS: u8 = 5;
    pub const IMMUTABLE_ALIAS_ADDRESS: u8 = 6;

    pub fn kind(&self) -> u8 {
        match self {
            UnlockCondition::Address(_) => Self::ADDRESS,
            UnlockCondition::StorageDepositReturn { .. } => Self::STORAGE_DEPOSIT_RETURN,
            UnlockCondition::Timelock { .. } => Self::TIMELOCK,
            UnlockCondition::Expiration { .. } => Self::EXPIRATION,
            UnlockCondition::StateControllerAddress(_) => Self::STATE_CONTROLLER_ADDRESS,
            UnlockCondition::GovernorAddress(_) => Self::GOVERNOR_ADDRESS,
            UnlockCondition::ImmutableAliasAddress(_) => Self::IMMUTABLE_ALIAS_ADDRESS,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockConditionRepr {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    return_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unix_time: Option<u32>,
}

impl From<UnlockCondition> for UnlockConditionRepr {
    fn from(condition: UnlockCondition) -> Self {
        let mut repr = UnlockConditionRepr {
            kind: condition.kind(),
            address: None,
            return_address: None,
            amount: None,
            unix_time: None,
        };
        match condition {
            UnlockCondition::Address(address)
            | UnlockCondition::StateControllerAddress(address)
            | UnlockCondition::GovernorAddress(address) => repr.address = Some(address),
            UnlockCondition::ImmutableAliasAddress(alias_id) => {
                repr.address = Some(Address::Alias(alias_id))
            }
            UnlockCondition::StorageDepositReturn {
                return_address,
                amount,
            } => {
                repr.return_address = Some(return_address);
                repr.amount = Some(amount.to_string());
            }
            UnlockCondition::Timelock { unix_time } => repr.unix_time = Some(unix_time),
            UnlockCondition::Expiration {
                return_address,
                unix_time,
            } => {
                repr.return_address = Some(return_address);
                repr.unix_time = Some(unix_time);
            }
        }
        repr
    }
}

impl TryFrom<UnlockConditionRepr> for UnlockCondition {
    type Error = Error;

    fn try_from(repr: UnlockConditionRepr) -> Result<Self> {
        let missing = |field: &str| {
            Error::InvalidOutput(format!(
                "unlock condition {} is missing `{}`",
                repr.kind, field
            ))
        };
        Ok(match repr.kind {
            Self::ADDRESS => UnlockCondition::Address(repr.address.ok_or_else(|| missing("address"))?),
            Self::STORAGE_DEPOSIT_RETURN => UnlockCondition::StorageDepositReturn {
                return_address: repr.return_address.ok_or_else(|| missing("returnAddress"))?,
                amount: repr
                    .amount
                    .as_deref()
                    .ok_or_else(|| missing("amount"))?
                    .parse()
                    .map_err(|_| Error::InvalidOutput("invalid return amount".to_string()))?,
            },
            Self::TIMELOCK => UnlockCondition::Timelock {
                unix_time: repr.unix_time.ok_or_else(|| missing("unixTime"))?,
            },
            Self::EXPIRATION => UnlockCondition::Expiration {
                return_address: repr.return_address.ok_or_else(|| missing("returnAddress"))?,
                unix_time: repr.unix_time.ok_or_else(|| missing("unixTime"))?,
            },
            Self::STATE_CONTROLLER_ADDRESS => UnlockCondition::StateControllerAddress(
                repr.address.ok_or_else(|| missing("address"))?,
            ),
            Self::GOVERNOR_ADDRESS => {
                UnlockCondition::GovernorAddress(repr.address.ok_or_else(|| missing("address"))?)
            }
            Self::IMMUTABLE_ALIAS_ADDRESS => match repr.address.ok_or_else(|| missing("address"))? {
                Address::Alias(alias_id) => UnlockCondition::ImmutableAliasAddress(alias_id),
                _ => {
                    return Err(Error::InvalidOutput(
                        "immutable alias address must be an alias address".to_string(),
                    ))
                }
            },
            other => {
                return Err(Error::InvalidOutput(format!(
                    "unknown unlock condition type {}",
                    other
                )))
            }
        })
    }
}

// ===== Features =====

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FeatureRepr", into = "FeatureRepr")]
pub enum Feature {
    Sender(Address),
    Issuer(Address),
    Metadata(Vec<u8>),
    Tag(Vec<u8>),
}

impl Feature {
    pub const SENDER: u8 = 0;
    pub const ISSUER: u8 = 1;
    pub const METADATA: u8 = 2;
    pub const TAG: u8 = 3;

    pub fn kind(&self) -> u8 {
        match self {
            Feature::Sender(_) => Self::SENDER,
            Feature::Issuer(_) => Self::ISSUER,
            Feature::Metadata(_) => Self::METADATA,
            Feature::Tag(_) => Self::TAG,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FeatureRepr {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

impl From<Feature> for FeatureRepr {
    fn from(feature: Feature) -> Self {
        let kind = feature.kind();
        let (address, data, tag) = match feature {
            Feature::Sender(a) | Feature::Issuer(a) => (Some(a), None, None),
            Feature::Metadata(d) => (None, Some(serde_hex::encode(d)), None),
            Feature::Tag(t) => (None, None, Some(serde_hex::encode(t))),
        };
        FeatureRepr {
            kind,
            address,
            data,
            tag,
        }
    }
}

impl TryFrom<FeatureRepr> for Feature {
    type Error = Error;

    fn try_from(repr: FeatureRepr) -> Result<Self> {
        let missing = |field: &str| {
            Error::InvalidOutput(format!("feature {} is missing `{}`", repr.kind, field))
        };
        Ok(match repr.kind {
            Self::SENDER => Feature::Sender(repr.address.ok_or_else(|| missing("address"))?),
            Self::ISSUER => Feature::Issuer(repr.address.ok_or_else(|| missing("address"))?),
            Self::METADATA => {
                let data = serde_hex::decode(repr.data.as_deref().ok_or_else(|| missing("data"))?)?;
                if data.is_empty() || data.len() > MAX_METADATA_LENGTH {
                    return Err(Error::InvalidOutput(format!(
                        "metadata length {} outside 1..={}",
                        data.len(),
                        MAX_METADATA_LENGTH
                    )));
                }
                Feature::Metadata(data)
            }
            Self::TAG => {
                let tag = serde_hex::decode(repr.tag.as_deref().ok_or_else(|| missing("tag"))?)?;
                if tag.is_empty() || tag.len() > MAX_TAG_LENGTH {
                    return Err(Error::InvalidOutput(format!(
                        "tag length {} outside 1..={}",
                        tag.len(),
                        MAX_TAG_LENGTH
                    )));
                }
                Feature::Tag(tag)
            }
            other => return Err(Error::InvalidOutput(format!("unknown feature type {}", other))),
        })
    }
}

// ===== Rent =====

/// Parameters of the storage deposit every output must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentStructure {
    pub v_byte_cost: u32,
    pub v_byte_factor_data: u8,
    pub v_byte_factor_key: u8,
}

impl Default for RentStructure {
    fn default() -> Self {
        Self {
            v_byte_cost: 100,
            v_byte_factor_data: 1,
            v_byte_factor_key: 10,
        }
    }
}

impl RentStructure {
    /// Bytes a node indexes per output besides the output itself:
    /// output id, block id, milestone index and timestamp.
    const KEY_BYTES: u64 = OutputId::LENGTH as u64 + 32 + 4 + 4;

    pub fn min_storage_deposit(&self, output: &Output) -> Result<u64> {
        let data_bytes = bincode::serialized_size(output)?;
        let v_bytes = data_bytes * self.v_byte_factor_data as u64
            + Self::KEY_BYTES * self.v_byte_factor_key as u64;
        Ok(v_bytes * self.v_byte_cost as u64)
    }
}

// ===== Outputs =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOutput {
    #[serde(with = "serde_hex::string_u64")]
    pub amount: u64,
    pub unlock_conditions: Vec<UnlockCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasOutput {
    #[serde(with = "serde_hex::string_u64")]
    pub amount: u64,
    pub alias_id: AliasId,
    pub state_index: u32,
    #[serde(default, with = "serde_hex::bytes")]
    pub state_metadata: Vec<u8>,
    pub foundry_counter: u32,
    pub unlock_conditions: Vec<UnlockCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub immutable_features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOutput {
    #[serde(with = "serde_hex::string_u64")]
    pub amount: u64,
    pub nft_id: NftId,
    pub unlock_conditions: Vec<UnlockCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub immutable_features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
    Basic(BasicOutput),
    Alias(AliasOutput),
    Nft(NftOutput),
}

impl Output {
    pub fn amount(&self) -> u64 {
        match self {
            Output::Basic(o) => o.amount,
            Output::Alias(o) => o.amount,
            Output::Nft(o) => o.amount,
        }
    }

    pub fn unlock_conditions(&self) -> &[UnlockCondition] {
        match self {
            Output::Basic(o) => &o.unlock_conditions,
            Output::Alias(o) => &o.unlock_conditions,
            Output::Nft(o) => &o.unlock_conditions,
        }
    }

    pub fn features(&self) -> &[Feature] {
        match self {
            Output::Basic(o) => &o.features,
            Output::Alias(o) => &o.features,
            Output::Nft(o) => &o.features,
        }
    }

    /// Address whose signature unlocks this output: the plain address
    /// condition, or the state controller for aliases.
    pub fn owning_address(&self) -> Option<&Address> {
        self.unlock_conditions().iter().find_map(|c| match c {
            UnlockCondition::Address(a) | UnlockCondition::StateControllerAddress(a) => Some(a),
            _ => None,
        })
    }

    /// True for basic outputs that only need a signature to be spent.
    pub fn is_simple_basic(&self) -> bool {
        matches!(self, Output::Basic(_))
            && self
                .unlock_conditions()
                .iter()
                .all(|c| matches!(c, UnlockCondition::Address(_)))
    }

    pub fn validate(&self) -> Result<()> {
        let (allowed_conditions, required_conditions, allowed_features, immutable): (
            &[u8],
            &[u8],
            &[u8],
            &[Feature],
        ) = match self {
            Output::Basic(_) => (&[0, 1, 2, 3], &[0], &[0, 2, 3], &[]),
            Output::Alias(o) => (&[4, 5], &[4, 5], &[0, 2], &o.immutable_features),
            Output::Nft(o) => (&[0, 1, 2, 3], &[0], &[0, 2, 3], &o.immutable_features),
        };

        let mut seen = HashSet::new();
        for condition in self.unlock_conditions() {
            let kind = condition.kind();
            if !allowed_conditions.contains(&kind) {
                return Err(Error::InvalidOutput(format!(
                    "unlock condition {} not allowed on this output",
                    kind
                )));
            }
            if !seen.insert(kind) {
                return Err(Error::InvalidOutput(format!(
                    "duplicate unlock condition {}",
                    kind
                )));
            }
        }
        if let Some(kind) = required_conditions.iter().find(|k| !seen.contains(*k)) {
            return Err(Error::InvalidOutput(format!(
                "missing required unlock condition {}",
                kind
            )));
        }

        let mut seen = HashSet::new();
        for feature in self.features() {
            if !allowed_features.contains(&feature.kind()) || !seen.insert(feature.kind()) {
                return Err(Error::InvalidOutput(format!(
                    "feature {} not allowed or duplicated",
                    feature.kind()
                )));
            }
        }
        let mut seen = HashSet::new();
        for feature in immutable {
            if !matches!(feature, Feature::Issuer(_) | Feature::Metadata(_))
                || !seen.insert(feature.kind())
            {
                return Err(Error::InvalidOutput(format!(
                    "immutable feature {} not allowed or duplicated",
                    feature.kind()
                )));
            }
        }
        Ok(())
    }
}

// ===== Builders =====

/// Amount policy shared by the output builders.
#[derive(Debug, Clone, Copy)]
enum OutputAmount {
    Fixed(u64),
    MinimumStorageDeposit(RentStructure),
}

fn finish_output(amount: OutputAmount, mut output: Output, rent: Option<RentStructure>) -> Result<Output> {
    output.validate()?;
    let required_rent = match amount {
        OutputAmount::Fixed(_) => rent,
        OutputAmount::MinimumStorageDeposit(rent) => Some(rent),
    };
    if let Some(rent) = required_rent {
        let deposit = rent.min_storage_deposit(&output)?;
        match (&mut output, amount) {
            (_, OutputAmount::Fixed(fixed)) if fixed < deposit => {
                return Err(Error::InvalidOutput(format!(
                    "amount {} is below the storage deposit {}",
                    fixed, deposit
                )))
            }
            (Output::Basic(o), OutputAmount::MinimumStorageDeposit(_)) => o.amount = deposit,
            (Output::Alias(o), OutputAmount::MinimumStorageDeposit(_)) => o.amount = deposit,
            (Output::Nft(o), OutputAmount::MinimumStorageDeposit(_)) => o.amount = deposit,
            _ => {}
        }
    }
    Ok(output)
}

macro_rules! common_builder_methods {
    () => {
        pub fn add_unlock_condition(mut self, condition: UnlockCondition) -> Self {
            self.unlock_conditions.push(condition);
            self
        }

        pub fn with_unlock_conditions(mut self, conditions: impl IntoIterator<Item = UnlockCondition>) -> Self {
            self.unlock_conditions = conditions.into_iter().collect();
            self
        }

        pub fn add_feature(mut self, feature: Feature) -> Self {
            self.features.push(feature);
            self
        }

        pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
            self.features = features.into_iter().collect();
            self
        }

        /// Rejects amounts below the deposit required by `rent`.
        pub fn with_rent_check(mut self, rent: RentStructure) -> Self {
            self.rent = Some(rent);
            self
        }
    };
}

#[derive(Debug, Clone)]
#[must_use]
pub struct BasicOutputBuilder {
    amount: OutputAmount,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    rent: Option<RentStructure>,
}

impl BasicOutputBuilder {
    pub fn new_with_amount(amount: u64) -> Self {
        Self::new(OutputAmount::Fixed(amount))
    }

    pub fn new_with_minimum_storage_deposit(rent: RentStructure) -> Self {
        Self::new(OutputAmount::MinimumStorageDeposit(rent))
    }

    fn new(amount: OutputAmount) -> Self {
        Self {
            amount,
            unlock_conditions: Vec::new(),
            features: Vec::new(),
            rent: None,
        }
    }

    common_builder_methods!();

    pub fn finish(self) -> Result<Output> {
        let output = Output::Basic(BasicOutput {
            amount: match self.amount {
                OutputAmount::Fixed(a) => a,
                OutputAmount::MinimumStorageDeposit(_) => 0,
            },
            unlock_conditions: self.unlock_conditions,
            features: self.features,
        });
        finish_output(self.amount, output, self.rent)
    }
}

#[derive(Debug, Clone)]
#[must_use]
pub struct AliasOutputBuilder {
    amount: OutputAmount,
    alias_id: AliasId,
    state_index: u32,
    state_metadata: Vec<u8>,
    foundry_counter: u32,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    immutable_features: Vec<Feature>,
    rent: Option<RentStructure>,
}

impl AliasOutputBuilder {
    pub fn new_with_amount(amount: u64, alias_id: AliasId) -> Self {
        Self::new(OutputAmount::Fixed(amount), alias_id)
    }

    pub fn new_with_minimum_storage_deposit(rent: RentStructure, alias_id: AliasId) -> Self {
        Self::new(OutputAmount::MinimumStorageDeposit(rent), alias_id)
    }

    fn new(amount: OutputAmount, alias_id: AliasId) -> Self {
        Self {
            amount,
            alias_id,
            state_index: 0,
            state_metadata: Vec::new(),
            foundry_counter: 0,
            unlock_conditions: Vec::new(),
            features: Vec::new(),
            immutable_features: Vec::new(),
            rent: None,
        }
    }

    common_builder_methods!();

    pub fn with_state_index(mut self, state_index: u32) -> Self {
        self.state_index = state_index;
        self
    }

    pub fn with_state_metadata(mut self, state_metadata: Vec<u8>) -> Self {
        self.state_metadata = state_metadata;
        self
    }

    pub fn with_foundry_counter(mut self, foundry_counter: u32) -> Self {
        self.foundry_counter = foundry_counter;
        self
    }

    pub fn with_immutable_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.immutable_features = features.into_iter().collect();
        self
    }

    pub fn finish(self) -> Result<Output> {
        let output = Output::Alias(AliasOutput {
            amount: match self.amount {
                OutputAmount::Fixed(a) => a,
                OutputAmount::MinimumStorageDeposit(_) => 0,
            },
            alias_id: self.alias_id,
            state_index: self.state_index,
            state_metadata: self.state_metadata,
            foundry_counter: self.foundry_counter,
            unlock_conditions: self.unlock_conditions,
            features: self.features,
            immutable_features: self.immutable_features,
        });
        finish_output(self.amount, output, self.rent)
    }
}

#[derive(Debug, Clone)]
#[must_use]
pub struct NftOutputBuilder {
    amount: OutputAmount,
    nft_id: NftId,
    unlock_conditions: Vec<UnlockCondition>,
    features: Vec<Feature>,
    immutable_features: Vec<Feature>,
    rent: Option<RentStructure>,
}

impl NftOutputBuilder {
    pub fn new_with_amount(amount: u64, nft_id: NftId) -> Self {
        Self::new(OutputAmount::Fixed(amount), nft_id)
    }

    pub fn new_with_minimum_storage_deposit(rent: RentStructure, nft_id: NftId) -> Self {
        Self::new(OutputAmount::MinimumStorageDeposit(rent), nft_id)
    }

    fn new(amount: OutputAmount, nft_id: NftId) -> Self {
        Self {
            amount,
            nft_id,
            unlock_conditions: Vec::new(),
            features: Vec::new(),
            immutable_features: Vec::new(),
            rent: None,
        }
    }

    common_builder_methods!();

    pub fn with_immutable_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.immutable_features = features.into_iter().collect();
        self
    }

    pub fn finish(self) -> Result<Output> {
        let output = Output::Nft(NftOutput {
            amount: match self.amount {
                OutputAmount::Fixed(a) => a,
                OutputAmount::MinimumStorageDeposit(_) => 0,
            },
            nft_id: self.nft_id,
            unlock_conditions: self.unlock_conditions,
            features: self.features,
            immutable_features: self.immutable_features,
        });
        finish_output(self.amount, output, self.rent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::Key([9; 32])
    }

    #[test]
    fn test_unlock_condition_tags_on_the_wire() {
        let cases = [
            (UnlockCondition::Address(owner()), 0),
            (
                UnlockCondition::StorageDepositReturn {
                    return_address: owner(),
                    amount: 10,
                },
                1,
            ),
            (UnlockCondition::Timelock { unix_time: 1 }, 2),
            (
                UnlockCondition::Expiration {
                    return_address: owner(),
                    unix_time: 1,
                },
                3,
            ),
            (UnlockCondition::StateControllerAddress(owner()), 4),
            (UnlockCondition::GovernorAddress(owner()), 5),
            (UnlockCondition::ImmutableAliasAddress(AliasId([1; 32])), 6),
        ];
        for (condition, tag) in cases {
            let json = serde_json::to_value(&condition).unwrap();
            assert_eq!(json["type"], tag);
            let back: UnlockCondition = serde_json::from_value(json).unwrap();
            assert_eq!(back, condition);
        }
    }

    #[test]
    fn test_feature_tags_on_the_wire() {
        let cases = [
            (Feature::Sender(owner()), 0),
            (Feature::Issuer(owner()), 1),
            (Feature::Metadata(vec![1]), 2),
            (Feature::Tag(vec![2]), 3),
        ];
        for (feature, tag) in cases {
            let json = serde_json::to_value(&feature).unwrap();
            assert_eq!(json["type"], tag);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = serde_json::from_str::<UnlockCondition>(r#"{"type": 9}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_basic_output_requires_address() {
        let err = BasicOutputBuilder::new_with_amount(1_000_000).finish();
        assert!(matches!(err, Err(Error::InvalidOutput(_))));

        let output = BasicOutputBuilder::new_with_amount(1_000_000)
            .add_unlock_condition(UnlockCondition::Address(owner()))
            .add_feature(Feature::Tag(b"hello".to_vec()))
            .finish()
            .unwrap();
        assert_eq!(output.amount(), 1_000_000);
        assert_eq!(output.owning_address(), Some(&owner()));
    }

    #[test]
    fn test_minimum_storage_deposit_sets_amount() {
        let rent = RentStructure::default();
        let output = BasicOutputBuilder::new_with_minimum_storage_deposit(rent)
            .add_unlock_condition(UnlockCondition::Address(owner()))
            .finish()
            .unwrap();
        assert!(output.amount() > 0);
        assert_eq!(output.amount(), rent.min_storage_deposit(&output).unwrap());
    }

    #[test]
    fn test_rent_check_rejects_dust() {
        let err = BasicOutputBuilder::new_with_amount(1)
            .add_unlock_condition(UnlockCondition::Address(owner()))
            .with_rent_check(RentStructure::default())
            .finish();
        assert!(matches!(err, Err(Error::InvalidOutput(_))));
    }

    #[test]
    fn test_alias_needs_both_controllers() {
        let err = AliasOutputBuilder::new_with_amount(1, AliasId::null())
            .add_unlock_condition(UnlockCondition::StateControllerAddress(owner()))
            .finish();
        assert!(err.is_err());

        let alias = AliasOutputBuilder::new_with_amount(1, AliasId::null())
            .add_unlock_condition(UnlockCondition::StateControllerAddress(owner()))
            .add_unlock_condition(UnlockCondition::GovernorAddress(owner()))
            .with_immutable_features([Feature::Issuer(owner())])
            .finish()
            .unwrap();
        assert_eq!(alias.owning_address(), Some(&owner()));
        let json = serde_json::to_value(&alias).unwrap();
        assert_eq!(json["type"], "alias");
    }

    #[test]
    fn test_output_id_string_form() {
        let id = OutputId::new(TransactionId([0xaa; 32]), 1);
        let s = id.to_string();
        assert_eq!(s.len(), 2 + 68);
        assert!(s.ends_with("0100"));
        assert_eq!(s.parse::<OutputId>().unwrap(), id);
    }
}
