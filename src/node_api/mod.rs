//! Typed node REST routes
//!
//! Reads of node info, outputs, output metadata and indexer queries go
//! through quorum when it is enabled. Everything else is answered by the
//! first candidate that succeeds.

pub mod indexer;
pub mod responses;

use crate::block::{AliasId, Block, BlockId, MilestoneId, NftId, OutputId, TransactionId};
use crate::client::Client;
use crate::config::NodeAuth;
use crate::error::{Error, Result};
use crate::node_manager::sync::NodeSynchronizer;
use crate::node_manager::Node;
use indexer::QueryParameter;
use responses::{
    BlockChildrenResponse, BlockMetadata, MilestonePayload, NodeInfo, NodeInfoWrapper, OutputIdsResponse,
    OutputMetadata, OutputWithMetadata, PeerResponse, SubmitBlockResponse, TipsResponse, UtxoChangesResponse,
};
use tracing::debug;

pub mod routes {
    use crate::block::{AliasId, BlockId, MilestoneId, NftId, OutputId, TransactionId};

    pub const HEALTH: &str = "health";
    pub const INFO: &str = "api/core/v2/info";
    pub const PEERS: &str = "api/core/v2/peers";
    pub const TIPS: &str = "api/core/v2/tips";
    pub const BLOCKS: &str = "api/core/v2/blocks";
    pub const MILESTONES: &str = "api/core/v2/milestones";
    pub const BASIC_OUTPUTS: &str = "api/indexer/v1/outputs/basic";
    pub const ALIAS_OUTPUTS: &str = "api/indexer/v1/outputs/alias";
    pub const NFT_OUTPUTS: &str = "api/indexer/v1/outputs/nft";

    pub fn block(block_id: &BlockId) -> String {
        format!("{}/{}", BLOCKS, block_id)
    }

    pub fn block_metadata(block_id: &BlockId) -> String {
        format!("{}/{}/metadata", BLOCKS, block_id)
    }

    pub fn block_children(block_id: &BlockId) -> String {
        format!("{}/{}/children", BLOCKS, block_id)
    }

    pub fn milestone(milestone_id: &MilestoneId) -> String {
        format!("{}/{}", MILESTONES, milestone_id)
    }

    pub fn milestone_by_index(index: u32) -> String {
        format!("{}/by-index/{}", MILESTONES, index)
    }

    pub fn utxo_changes(milestone_id: &MilestoneId) -> String {
        format!("{}/{}/utxo-changes", MILESTONES, milestone_id)
    }

    pub fn utxo_changes_by_index(index: u32) -> String {
        format!("{}/by-index/{}/utxo-changes", MILESTONES, index)
    }

    pub fn alias_output(alias_id: &AliasId) -> String {
        format!("{}/{}", ALIAS_OUTPUTS, alias_id)
    }

    pub fn nft_output(nft_id: &NftId) -> String {
        format!("{}/{}", NFT_OUTPUTS, nft_id)
    }

    pub fn output(output_id: &OutputId) -> String {
        format!("api/core/v2/outputs/{}", output_id)
    }

    pub fn output_metadata(output_id: &OutputId) -> String {
        format!("api/core/v2/outputs/{}/metadata", output_id)
    }

    pub fn included_block(transaction_id: &TransactionId) -> String {
        format!("api/core/v2/transactions/{}/included-block", transaction_id)
    }
}

impl Client {
    /// Health of an arbitrary node, outside the pool. 503 means unhealthy.
    pub async fn get_health(&self, url: &str) -> Result<bool> {
        let node = Node::new(url)?;
        match self.node_manager().get_from(&node, routes::HEALTH, None).await {
            Ok(_) => Ok(true),
            Err(Error::ResponseError { code: 503, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Info of an arbitrary node, outside the pool.
    pub async fn get_node_info(&self, url: &str, auth: Option<NodeAuth>) -> Result<NodeInfo> {
        let mut node = Node::new(url)?;
        node.auth = auth;
        NodeSynchronizer::fetch_info(self.node_manager(), &node).await
    }

    pub async fn get_info(&self) -> Result<NodeInfoWrapper> {
        let (node_info, url) = self
            .node_manager()
            .get_request_with_url(routes::INFO, None, true)
            .await?;
        Ok(NodeInfoWrapper { node_info, url })
    }

    pub async fn get_peers(&self) -> Result<Vec<PeerResponse>> {
        self.node_manager().get_request(routes::PEERS, None, false).await
    }

    pub async fn get_tips(&self) -> Result<Vec<BlockId>> {
        let response: TipsResponse = self.node_manager().get_request(routes::TIPS, None, false).await?;
        Ok(response.tips)
    }

    /// Posts a finished block as is. The nonce must already satisfy the
    /// network's minimum score.
    pub async fn post_block(&self, block: &Block) -> Result<BlockId> {
        block.validate_syntax()?;
        let body = serde_json::to_value(block)?;
        let response: SubmitBlockResponse = self
            .node_manager()
            .post_request(routes::BLOCKS, &body, false)
            .await?;
        debug!(block_id = %response.block_id, "block posted");
        Ok(response.block_id)
    }

    pub async fn post_block_json(&self, block: serde_json::Value) -> Result<BlockId> {
        let block: Block = serde_json::from_value(block)
            .map_err(|e| Error::InvalidBlock(e.to_string()))?;
        self.post_block(&block).await
    }

    /// Blocks are immutable, so hits are served from the cache.
    pub async fn get_block(&self, block_id: &BlockId) -> Result<Block> {
        if let Some(block) = self.inner.block_cache.get(block_id) {
            return Ok(block);
        }
        let block: Block = self
            .node_manager()
            .get_request(&routes::block(block_id), None, false)
            .await?;
        self.inner.block_cache.insert(*block_id, block.clone());
        Ok(block)
    }

    pub async fn get_block_metadata(&self, block_id: &BlockId) -> Result<BlockMetadata> {
        self.node_manager()
            .get_request(&routes::block_metadata(block_id), None, false)
            .await
    }

    /// Blocks that reference `block_id` as a parent, as far as the node knows.
    pub async fn get_block_children(&self, block_id: &BlockId) -> Result<Vec<BlockId>> {
        let response: BlockChildrenResponse = self
            .node_manager()
            .get_request(&routes::block_children(block_id), None, false)
            .await?;
        Ok(response.children)
    }

    pub async fn get_milestone_by_id(&self, milestone_id: &MilestoneId) -> Result<MilestonePayload> {
        self.node_manager()
            .get_request(&routes::milestone(milestone_id), None, false)
            .await
    }

    pub async fn get_milestone_by_index(&self, index: u32) -> Result<MilestonePayload> {
        self.node_manager()
            .get_request(&routes::milestone_by_index(index), None, false)
            .await
    }

    pub async fn get_utxo_changes_by_id(&self, milestone_id: &MilestoneId) -> Result<UtxoChangesResponse> {
        self.node_manager()
            .get_request(&routes::utxo_changes(milestone_id), None, true)
            .await
    }

    pub async fn get_utxo_changes_by_index(&self, index: u32) -> Result<UtxoChangesResponse> {
        self.node_manager()
            .get_request(&routes::utxo_changes_by_index(index), None, true)
            .await
    }

    pub async fn get_output(&self, output_id: &OutputId) -> Result<OutputWithMetadata> {
        self.node_manager()
            .get_request(&routes::output(output_id), None, true)
            .await
    }

    pub async fn get_output_metadata(&self, output_id: &OutputId) -> Result<OutputMetadata> {
        self.node_manager()
            .get_request(&routes::output_metadata(output_id), None, true)
            .await
    }

    pub async fn get_included_block(&self, transaction_id: &TransactionId) -> Result<Block> {
        self.node_manager()
            .get_request(&routes::included_block(transaction_id), None, false)
            .await
    }

    /// Basic output ids matching `query_parameters`, following the cursor
    /// until every page is collected. A caller supplied cursor returns one
    /// page.
    pub async fn basic_output_ids(&self, query_parameters: Vec<QueryParameter>) -> Result<OutputIdsResponse> {
        self.indexed_output_ids(routes::BASIC_OUTPUTS, query_parameters).await
    }

    /// Alias output ids, paginated like [`Client::basic_output_ids`].
    pub async fn alias_output_ids(&self, query_parameters: Vec<QueryParameter>) -> Result<OutputIdsResponse> {
        self.indexed_output_ids(routes::ALIAS_OUTPUTS, query_parameters).await
    }

    /// Current output of the alias chain `alias_id`.
    pub async fn alias_output_id(&self, alias_id: &AliasId) -> Result<OutputId> {
        self.indexed_output_id(&routes::alias_output(alias_id)).await
    }

    pub async fn nft_output_ids(&self, query_parameters: Vec<QueryParameter>) -> Result<OutputIdsResponse> {
        self.indexed_output_ids(routes::NFT_OUTPUTS, query_parameters).await
    }

    pub async fn nft_output_id(&self, nft_id: &NftId) -> Result<OutputId> {
        self.indexed_output_id(&routes::nft_output(nft_id)).await
    }

    async fn indexed_output_id(&self, path: &str) -> Result<OutputId> {
        let response: OutputIdsResponse = self.node_manager().get_request(path, None, true).await?;
        response
            .items
            .first()
            .copied()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn indexed_output_ids(&self, route: &str, query_parameters: Vec<QueryParameter>) -> Result<OutputIdsResponse> {
        let single_page = query_parameters
            .iter()
            .any(|p| matches!(p, QueryParameter::Cursor(_)));
        let mut params = query_parameters;
        let mut all = OutputIdsResponse {
            items: Vec::new(),
            cursor: None,
        };

        loop {
            let query = indexer::to_query_string(&params);
            let page: OutputIdsResponse = self
                .node_manager()
                .get_request(route, query.as_deref(), true)
                .await?;
            all.items.extend(page.items);
            match page.cursor {
                Some(cursor) if !single_page => {
                    params.retain(|p| !matches!(p, QueryParameter::Cursor(_)));
                    params.push(QueryParameter::Cursor(cursor));
                }
                cursor => {
                    all.cursor = cursor;
                    return Ok(all);
                }
            }
        }
    }
}
