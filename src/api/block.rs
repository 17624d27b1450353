//! Finishing and posting blocks
//!
//! Where the proof-of-work happens follows [`PowMode`]. Local mining runs on
//! a blocking task and is restarted with fresh tips every tips interval, so
//! a posted block never references stale parents. Parents chosen by the
//! caller are kept for as long as mining takes.

use crate::block::payload::Payload;
use crate::block::{Block, BlockId};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::node_api::responses::SubmitBlockResponse;
use crate::node_api::routes;
use crate::pow::{CancelOnDrop, MinerBuilder, MinerCancel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowMode {
    /// Always mine locally.
    Local,
    /// A node mines; fails when none offers it.
    Remote,
    /// A node mines when one offers it, otherwise mine locally.
    RemoteWithLocalFallback,
}

impl PowMode {
    pub fn from_flags(local_pow: bool, fallback_to_local_pow: bool) -> Self {
        match (local_pow, fallback_to_local_pow) {
            (true, _) => PowMode::Local,
            (false, true) => PowMode::RemoteWithLocalFallback,
            (false, false) => PowMode::Remote,
        }
    }
}

impl Client {
    pub fn pow_mode(&self) -> PowMode {
        PowMode::from_flags(self.get_local_pow(), self.get_fallback_to_local_pow())
    }

    /// Mines a block locally. Without `parents` the current tips are used
    /// and refreshed whenever the tips interval elapses.
    pub async fn finish_pow(&self, parents: Option<Vec<BlockId>>, payload: Option<Payload>) -> Result<Block> {
        let min_pow_score = self.get_min_pow_score();
        let tips_interval = Duration::from_secs(self.get_tips_interval().max(1));

        loop {
            let block_parents = match &parents {
                Some(parents) => parents.clone(),
                None => self.get_tips().await?,
            };
            let block = Block::new(block_parents, payload.clone());
            block.validate_syntax()?;
            let digest = block.pow_digest()?;

            let cancel = MinerCancel::new();
            let _guard = CancelOnDrop(cancel.clone());
            let mut builder = MinerBuilder::new().with_cancel(cancel.clone());
            if let Some(workers) = self.inner.pow_worker_count {
                builder = builder.with_num_workers(workers);
            }
            let miner = builder.finish();
            let mut task = tokio::task::spawn_blocking(move || miner.nonce(&digest, min_pow_score));

            let nonce = if parents.is_some() {
                (&mut task).await?
            } else {
                match tokio::time::timeout(tips_interval, &mut task).await {
                    Ok(joined) => joined?,
                    Err(_) => {
                        cancel.trigger();
                        let _ = task.await;
                        debug!("tips interval elapsed, mining again on fresh tips");
                        continue;
                    }
                }
            };
            let block = block.with_nonce(nonce?);
            debug!(score = block.pow_score()?, min_pow_score, "block mined");
            return Ok(block);
        }
    }

    /// Finishes and posts a block carrying `payload`. Returns the id and
    /// the block as the network holds it.
    pub async fn submit_block(
        &self,
        parents: Option<Vec<BlockId>>,
        payload: Option<Payload>,
    ) -> Result<(BlockId, Block)> {
        let mode = self.pow_mode();
        if mode != PowMode::Local {
            if self.node_manager().get_nodes(true).is_ok() {
                let block_parents = match parents {
                    Some(parents) => parents,
                    None => self.get_tips().await?,
                };
                let block = Block::new(block_parents, payload);
                block.validate_syntax()?;
                let body = serde_json::to_value(&block)?;
                let response: SubmitBlockResponse = self
                    .node_manager()
                    .post_request(routes::BLOCKS, &body, true)
                    .await?;
                info!(block_id = %response.block_id, "block posted with remote proof of work");
                // The node picks the nonce, and possibly new parents.
                let block = self.get_block(&response.block_id).await?;
                return Ok((response.block_id, block));
            }
            if mode == PowMode::Remote {
                return Err(Error::RemotePowUnsupported);
            }
            warn!("no node offers proof of work, mining locally");
        }

        let block = self.finish_pow(parents, payload).await?;
        let block_id = self.post_block(&block).await?;
        info!(block_id = %block_id, "block posted");
        Ok((block_id, block))
    }

    pub async fn post_block_payload(&self, payload: Payload) -> Result<Block> {
        Ok(self.submit_block(None, Some(payload)).await?.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow_mode_from_flags() {
        assert_eq!(PowMode::from_flags(true, false), PowMode::Local);
        assert_eq!(PowMode::from_flags(true, true), PowMode::Local);
        assert_eq!(PowMode::from_flags(false, true), PowMode::RemoteWithLocalFallback);
        assert_eq!(PowMode::from_flags(false, false), PowMode::Remote);
    }

    #[tokio::test]
    async fn test_offline_local_pow_with_fixed_parents() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let client = Client::builder()
                .with_offline_mode()
                .with_min_pow_score(8)
                .with_pow_worker_count(2)
                .finish()
                .await
                .unwrap();
            let block = client
                .finish_pow(Some(vec![BlockId([3; 32])]), None)
                .await
                .unwrap();
            assert!(block.pow_score().unwrap() >= 8);
            assert_eq!(block.parents, vec![BlockId([3; 32])]);

            assert!(matches!(client.finish_pow(None, None).await, Err(Error::OfflineMode)));
        })
        .await
        .expect("test_offline_local_pow_with_fixed_parents timed out");
    }
}
