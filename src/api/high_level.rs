//! Promotion, reattachment and bulk lookups

use crate::block::payload::Payload;
use crate::block::{Block, BlockId, OutputId};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::node_api::indexer::spendable_basic_outputs;
use crate::node_api::responses::{LedgerInclusionState, OutputWithMetadata};
use futures::future::{join_all, try_join_all};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL: u64 = 5;
pub const DEFAULT_RETRY_UNTIL_INCLUDED_MAX_ATTEMPTS: u64 = 40;

impl Client {
    /// Fetches all outputs concurrently; the first failure fails the call.
    pub async fn get_outputs(&self, output_ids: Vec<OutputId>) -> Result<Vec<OutputWithMetadata>> {
        try_join_all(output_ids.iter().map(|id| self.get_output(id))).await
    }

    /// Fetches all outputs concurrently, dropping the ones that failed.
    pub async fn try_get_outputs(&self, output_ids: Vec<OutputId>) -> Result<Vec<OutputWithMetadata>> {
        let results = join_all(output_ids.iter().map(|id| self.get_output(id))).await;
        Ok(results.into_iter().filter_map(Result::ok).collect())
    }

    /// Blocks by id, each id fetched once.
    pub async fn find_blocks(&self, block_ids: &[BlockId]) -> Result<Vec<Block>> {
        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        for block_id in block_ids.iter().filter(|id| seen.insert(**id)) {
            blocks.push(self.get_block(block_id).await?);
        }
        Ok(blocks)
    }

    /// The given outputs plus the spendable outputs of `addresses`.
    pub async fn find_outputs(&self, output_ids: &[OutputId], addresses: &[String]) -> Result<Vec<OutputWithMetadata>> {
        let mut outputs = self.get_outputs(output_ids.to_vec()).await?;
        for address in addresses {
            let ids = self
                .basic_output_ids(spendable_basic_outputs(address))
                .await?
                .items;
            outputs.extend(self.get_outputs(ids).await?);
        }
        Ok(outputs)
    }

    /// Promotes or reattaches, whichever the node asks for.
    pub async fn retry(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let metadata = self.get_block_metadata(block_id).await?;
        if metadata.should_promote.unwrap_or(false) {
            self.promote_unchecked(block_id).await
        } else if metadata.should_reattach.unwrap_or(false) {
            self.reattach_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Retries until one attachment of the block is included.
    ///
    /// Returns the included block first, followed by the reattachments made
    /// on the way. Gives up with `TangleInclusion` after `max_attempts`
    /// rounds of `interval` seconds.
    pub async fn retry_until_included(
        &self,
        block_id: &BlockId,
        interval: Option<u64>,
        max_attempts: Option<u64>,
    ) -> Result<Vec<(BlockId, Block)>> {
        let interval = Duration::from_secs(interval.unwrap_or(DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL));
        let max_attempts = max_attempts.unwrap_or(DEFAULT_RETRY_UNTIL_INCLUDED_MAX_ATTEMPTS);

        let mut attachments = vec![*block_id];
        let mut reattached: Vec<(BlockId, Block)> = Vec::new();
        for attempt in 0..max_attempts {
            tokio::time::sleep(interval).await;
            debug!(%block_id, attempt, attachments = attachments.len(), "checking inclusion");

            let mut conflicting = false;
            let last = attachments.len() - 1;
            for (index, attachment) in attachments.clone().iter().enumerate() {
                let metadata = self.get_block_metadata(attachment).await?;
                match metadata.ledger_inclusion_state {
                    Some(LedgerInclusionState::Included) | Some(LedgerInclusionState::NoTransaction) => {
                        if attachment == block_id {
                            let mut included = vec![(*block_id, self.get_block(block_id).await?)];
                            included.extend(reattached);
                            return Ok(included);
                        }
                        // attachments[i] for i > 0 is reattached[i - 1]
                        reattached.rotate_left(index - 1);
                        return Ok(reattached);
                    }
                    Some(LedgerInclusionState::Conflicting) => conflicting = true,
                    None => {}
                }

                if index == last {
                    if metadata.should_promote.unwrap_or(false) {
                        self.promote_unchecked(attachment).await?;
                    } else if metadata.should_reattach.unwrap_or(false) {
                        let (id, block) = self.reattach_unchecked(attachment).await?;
                        attachments.push(id);
                        reattached.push((id, block));
                    }
                }
            }

            // Another block may carry the same transaction and be included.
            if conflicting {
                let block = self.get_block(block_id).await?;
                if let Some(transaction) = block.transaction() {
                    let included_block = self.get_included_block(&transaction.id()?).await?;
                    let mut included = vec![(included_block.id()?, included_block)];
                    included.extend(reattached);
                    return Ok(included);
                }
            }
        }
        Err(Error::TangleInclusion(block_id.to_string()))
    }

    pub async fn reattach(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let metadata = self.get_block_metadata(block_id).await?;
        if metadata.should_reattach.unwrap_or(false) {
            self.reattach_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Posts the block's payload again on fresh tips.
    pub async fn reattach_unchecked(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let block = self.get_block(block_id).await?;
        let payload: Option<Payload> = block.payload;
        let reattached = self.submit_block(None, payload).await?;
        info!(%block_id, reattached = %reattached.0, "block reattached");
        Ok(reattached)
    }

    pub async fn promote(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let metadata = self.get_block_metadata(block_id).await?;
        if metadata.should_promote.unwrap_or(false) {
            self.promote_unchecked(block_id).await
        } else {
            Err(Error::NoNeedPromoteOrReattach(block_id.to_string()))
        }
    }

    /// Posts an empty block approving `block_id` and the current tips.
    pub async fn promote_unchecked(&self, block_id: &BlockId) -> Result<(BlockId, Block)> {
        let mut parents = self.get_tips().await?;
        match parents.first_mut() {
            Some(tip) => *tip = *block_id,
            None => parents.push(*block_id),
        }
        let promoted = self.submit_block(Some(parents), None).await?;
        info!(%block_id, promoted = %promoted.0, "block promoted");
        Ok(promoted)
    }
}
