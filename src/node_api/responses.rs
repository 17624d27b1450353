//! Response bodies of the node REST API

use crate::block::output::{Output, RentStructure};
use crate::block::{serde_hex, BlockId, MilestoneId, OutputId, TransactionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub version: String,
    pub status: NodeStatus,
    pub protocol: ProtocolParameters,
    #[serde(default)]
    pub features: Vec<String>,
}

impl NodeInfo {
    pub fn supports_remote_pow(&self) -> bool {
        self.features.iter().any(|f| f == "pow")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub is_healthy: bool,
    pub latest_milestone: MilestoneRef,
    #[serde(default)]
    pub confirmed_milestone: Option<MilestoneRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRef {
    pub index: u32,
    #[serde(default)]
    pub timestamp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParameters {
    pub version: u8,
    pub network_name: String,
    pub bech32_hrp: String,
    pub min_pow_score: u32,
    pub rent_structure: RentStructure,
    #[serde(with = "serde_hex::string_u64")]
    pub token_supply: u64,
}

/// Node info together with the node that served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoWrapper {
    pub node_info: NodeInfo,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipsResponse {
    pub tips: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBlockResponse {
    pub block_id: BlockId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerInclusionState {
    Included,
    Conflicting,
    NoTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub block_id: BlockId,
    pub parents: Vec<BlockId>,
    pub is_solid: bool,
    #[serde(default)]
    pub referenced_by_milestone_index: Option<u32>,
    #[serde(default)]
    pub ledger_inclusion_state: Option<LedgerInclusionState>,
    #[serde(default)]
    pub should_promote: Option<bool>,
    #[serde(default)]
    pub should_reattach: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub block_id: BlockId,
    pub transaction_id: TransactionId,
    pub output_index: u16,
    pub is_spent: bool,
    #[serde(default)]
    pub milestone_index_booked: u32,
    #[serde(default)]
    pub milestone_timestamp_booked: u32,
}

impl OutputMetadata {
    pub fn output_id(&self) -> OutputId {
        OutputId::new(self.transaction_id, self.output_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputWithMetadata {
    pub metadata: OutputMetadata,
    pub output: Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputIdsResponse {
    pub items: Vec<OutputId>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    pub id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub multi_addresses: Vec<String>,
    pub connected: bool,
}

/// A milestone as served by the node. Fields the client does not interpret
/// are kept as they came.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePayload {
    pub index: u32,
    pub timestamp: u32,
    pub previous_milestone_id: MilestoneId,
    pub parents: Vec<BlockId>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoChangesResponse {
    pub index: u32,
    pub created_outputs: Vec<OutputId>,
    pub consumed_outputs: Vec<OutputId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChildrenResponse {
    pub block_id: BlockId,
    pub max_results: usize,
    pub count: usize,
    pub children: Vec<BlockId>,
}
