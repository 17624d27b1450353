use crate::block::address::Address;
use crate::block::output::{Output, OutputId};
use crate::block::payload::{TransactionPayload, UtxoInput};
use crate::block::{Block, BlockId, TransactionId};
use crate::client::NetworkInfo;
use crate::error::{Error, ErrorKind};
use crate::node_api::responses::{
    BlockMetadata, MilestonePayload, NodeInfo, NodeInfoWrapper, OutputIdsResponse, OutputMetadata, OutputWithMetadata,
    PeerResponse, UtxoChangesResponse,
};
use crate::node_manager::Node;
use crate::secret::types::{LedgerNanoStatus, PreparedTransactionData};
use serde::Serialize;

/// Result of a successful [`super::Message`]. Serialized as the bare value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    BuiltOutput(Output),
    /// Bech32 addresses.
    GeneratedAddresses(Vec<String>),
    Node(Node),
    NetworkInfo(NetworkInfo),
    /// Decimal string, it does not fit every binding's number type.
    NetworkId(String),
    Bech32Hrp(String),
    MinPowScore(u32),
    TipsInterval(u64),
    LocalPow(bool),
    FallbackToLocalPow(bool),
    UnhealthyNodes(Vec<Node>),
    LedgerNanoStatus(LedgerNanoStatus),
    PreparedTransactionData(PreparedTransactionData),
    SignedTransaction(TransactionPayload),
    Health(bool),
    NodeInfo(NodeInfo),
    Info(NodeInfoWrapper),
    Peers(Vec<PeerResponse>),
    Tips(Vec<BlockId>),
    Block(Block),
    BlockMetadata(BlockMetadata),
    BlockChildren(Vec<BlockId>),
    Milestone(MilestonePayload),
    UtxoChanges(UtxoChangesResponse),
    Output(OutputWithMetadata),
    OutputMetadata(OutputMetadata),
    Outputs(Vec<OutputWithMetadata>),
    OutputIdsResponse(OutputIdsResponse),
    OutputId(OutputId),
    Blocks(Vec<Block>),
    /// The included block first, then the reattachments.
    RetryUntilIncludedSuccessful(Vec<(BlockId, Block)>),
    Retried((BlockId, Block)),
    Inputs(Vec<UtxoInput>),
    Reattached((BlockId, Block)),
    Promoted((BlockId, Block)),
    Bech32ToHex(String),
    Bech32Address(String),
    ParsedBech32Address(Address),
    IsAddressValid(bool),
    GeneratedMnemonic(String),
    MnemonicHexSeed(String),
    BlockId(BlockId),
    TransactionId(TransactionId),
    /// `0x` hex.
    TransactionEssenceHash(String),
    Ok,
}

/// The reply envelope: `{"type": "Success", "payload": ...}` or
/// `{"type": "Error", "payload": "<message>", "kind": "<kind>"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    Success { payload: ResponsePayload },
    Error { payload: String, kind: ErrorKind },
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Response::Error {
            kind: error.kind(),
            payload: error.to_string(),
        }
    }
}

impl From<ResponsePayload> for Response {
    fn from(payload: ResponsePayload) -> Self {
        Response::Success { payload }
    }
}
