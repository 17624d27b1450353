use crate::api::PrepareTransactionOptions;
use crate::block::output::{Feature, OutputId, UnlockCondition};
use crate::block::payload::{Payload, TransactionEssence, TransactionPayload};
use crate::block::{AliasId, Block, BlockId, MilestoneId, NftId, TransactionId};
use crate::config::NodeAuth;
use crate::events::Topic;
use crate::node_api::indexer::QueryParameter;
use crate::secret::types::{GenerateAddressesOptions, PreparedTransactionData};
use crate::secret::SecretManagerDto;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A mnemonic on the wire: redacted in `Debug`, erased on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct MnemonicString(String);

impl MnemonicString {
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self(mnemonic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for MnemonicString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Every command a binding can send.
///
/// On the wire: `{"name": "<Variant>", "data": {<camelCase fields>}}`.
/// Amounts are decimal strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all_fields = "camelCase")]
pub enum Message {
    /// Without `amount` the minimum storage deposit is used.
    BuildBasicOutput {
        amount: Option<String>,
        unlock_conditions: Vec<UnlockCondition>,
        features: Option<Vec<Feature>>,
    },
    BuildAliasOutput {
        amount: Option<String>,
        alias_id: AliasId,
        state_index: Option<u32>,
        /// Hex.
        state_metadata: Option<String>,
        foundry_counter: Option<u32>,
        unlock_conditions: Vec<UnlockCondition>,
        features: Option<Vec<Feature>>,
        immutable_features: Option<Vec<Feature>>,
    },
    BuildNftOutput {
        amount: Option<String>,
        nft_id: NftId,
        unlock_conditions: Vec<UnlockCondition>,
        features: Option<Vec<Feature>>,
        immutable_features: Option<Vec<Feature>>,
    },
    /// Removes the listeners of `topics`, all of them when empty.
    ClearListeners {
        topics: Vec<Topic>,
    },
    GenerateAddresses {
        secret_manager: SecretManagerDto,
        options: GenerateAddressesOptions,
    },
    BuildAndPostBlock {
        secret_manager: Option<SecretManagerDto>,
        options: Option<PrepareTransactionOptions>,
    },
    GetNode,
    GetNetworkInfo,
    GetNetworkId,
    GetBech32Hrp,
    GetMinPowScore,
    GetTipsInterval,
    GetLocalPow,
    GetFallbackToLocalPow,
    UnhealthyNodes,
    GetLedgerNanoStatus {
        is_simulator: bool,
    },
    PrepareTransaction {
        secret_manager: Option<SecretManagerDto>,
        options: PrepareTransactionOptions,
    },
    /// Without `range` the addresses known from the inputs are searched.
    SignTransaction {
        secret_manager: SecretManagerDto,
        prepared_transaction_data: PreparedTransactionData,
        range: Option<Range<u32>>,
    },
    StoreMnemonic {
        secret_manager: SecretManagerDto,
        mnemonic: MnemonicString,
    },
    PostBlockPayload {
        payload: Payload,
    },

    // Node core API
    GetHealth {
        url: String,
    },
    GetNodeInfo {
        url: String,
        auth: Option<NodeAuth>,
    },
    GetInfo,
    GetPeers,
    GetTips,
    PostBlockJson {
        block: serde_json::Value,
    },
    GetBlock {
        block_id: BlockId,
    },
    GetBlockMetadata {
        block_id: BlockId,
    },
    GetBlockChildren {
        block_id: BlockId,
    },
    GetMilestoneById {
        milestone_id: MilestoneId,
    },
    GetMilestoneByIndex {
        index: u32,
    },
    GetUtxoChangesById {
        milestone_id: MilestoneId,
    },
    GetUtxoChangesByIndex {
        index: u32,
    },
    GetOutput {
        output_id: OutputId,
    },
    GetOutputMetadata {
        output_id: OutputId,
    },
    GetIncludedBlock {
        transaction_id: TransactionId,
    },

    // Indexer
    BasicOutputIds {
        query_parameters: Vec<QueryParameter>,
    },
    AliasOutputIds {
        query_parameters: Vec<QueryParameter>,
    },
    AliasOutputId {
        alias_id: AliasId,
    },
    NftOutputIds {
        query_parameters: Vec<QueryParameter>,
    },
    NftOutputId {
        nft_id: NftId,
    },

    // High level API
    GetOutputs {
        output_ids: Vec<OutputId>,
    },
    TryGetOutputs {
        output_ids: Vec<OutputId>,
    },
    FindBlocks {
        block_ids: Vec<BlockId>,
    },
    Retry {
        block_id: BlockId,
    },
    /// `interval` in seconds.
    RetryUntilIncluded {
        block_id: BlockId,
        interval: Option<u64>,
        max_attempts: Option<u64>,
    },
    FindInputs {
        addresses: Vec<String>,
        amount: u64,
    },
    FindOutputs {
        output_ids: Vec<OutputId>,
        addresses: Vec<String>,
    },
    Reattach {
        block_id: BlockId,
    },
    ReattachUnchecked {
        block_id: BlockId,
    },
    Promote {
        block_id: BlockId,
    },
    PromoteUnchecked {
        block_id: BlockId,
    },

    // Utils
    Bech32ToHex {
        bech32: String,
    },
    /// Without `bech32_hrp` the network's HRP is used.
    HexToBech32 {
        hex: String,
        bech32_hrp: Option<String>,
    },
    HexPublicKeyToBech32Address {
        hex: String,
        bech32_hrp: Option<String>,
    },
    ParseBech32Address {
        address: String,
    },
    IsAddressValid {
        address: String,
    },
    GenerateMnemonic,
    MnemonicToHexSeed {
        mnemonic: MnemonicString,
    },
    BlockId {
        block: Block,
    },
    TransactionId {
        payload: TransactionPayload,
    },
    HashTransactionEssence {
        essence: TransactionEssence,
    },
}
