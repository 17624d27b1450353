//! Proof-of-work
//!
//! A block's score is the number of leading zero bits of
//! `SHA-256(pow_digest || nonce_le)`. The miner splits the nonce space into
//! one stripe per worker and stops as soon as any worker finds a nonce or the
//! shared [`MinerCancel`] flag is raised.

use crate::block::Sha256Hash;
use crate::error::{Error, Result};
use crossbeam_channel::bounded;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Nonces tried between two checks of the stop flags.
const BATCH_SIZE: u64 = 1024;

fn pow_hash(digest: &Sha256Hash, nonce: u64) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(digest);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// Score of `nonce` against a block's PoW digest.
pub fn score(digest: &Sha256Hash, nonce: u64) -> u32 {
    let hash = pow_hash(digest, nonce);
    let mut bits = 0;
    for byte in hash {
        if byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Largest hash that still reaches `min_score` leading zero bits.
pub fn score_to_target(min_score: u32) -> Sha256Hash {
    let mut target = [0xFF; 32];
    let leading_zeros = (min_score / 8).min(32);
    let partial_bits = min_score % 8;

    for item in target.iter_mut().take(leading_zeros as usize) {
        *item = 0;
    }
    if leading_zeros < 32 && partial_bits > 0 {
        target[leading_zeros as usize] = 0xFF >> partial_bits;
    }
    target
}

/// Shared cancellation flag for a running miner.
#[derive(Debug, Clone, Default)]
pub struct MinerCancel(Arc<AtomicBool>);

impl MinerCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Raises the flag when dropped, so abandoning the future that owns it
/// stops the workers.
pub(crate) struct CancelOnDrop(pub(crate) MinerCancel);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

#[derive(Debug, Default)]
#[must_use]
pub struct MinerBuilder {
    num_workers: Option<usize>,
    cancel: Option<MinerCancel>,
}

impl MinerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers.max(1));
        self
    }

    pub fn with_cancel(mut self, cancel: MinerCancel) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn finish(self) -> Miner {
        Miner {
            num_workers: self.num_workers.unwrap_or_else(default_workers),
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// CPU miner running its workers on a dedicated rayon pool.
#[derive(Debug, Clone)]
pub struct Miner {
    num_workers: usize,
    cancel: MinerCancel,
}

impl Miner {
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn cancel_handle(&self) -> MinerCancel {
        self.cancel.clone()
    }

    /// Blocks until a nonce reaching `min_score` is found or the miner is
    /// cancelled.
    pub fn nonce(&self, digest: &Sha256Hash, min_score: u32) -> Result<u64> {
        if min_score == 0 {
            return Ok(0);
        }
        let target = score_to_target(min_score);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_workers)
            .thread_name(|i| format!("pow-worker-{}", i))
            .build()
            .map_err(|e| Error::Task(e.to_string()))?;

        let found = AtomicBool::new(false);
        let (tx, rx) = bounded::<u64>(self.num_workers);
        let stripe = u64::MAX / self.num_workers as u64;

        pool.scope(|scope| {
            for worker in 0..self.num_workers as u64 {
                let tx = tx.clone();
                let found = &found;
                let cancel = &self.cancel;
                scope.spawn(move |_| {
                    let start = worker * stripe;
                    let end = start.saturating_add(stripe);
                    let mut nonce = start;
                    while nonce < end {
                        if found.load(Ordering::Relaxed) || cancel.is_cancelled() {
                            return;
                        }
                        let batch_end = nonce.saturating_add(BATCH_SIZE).min(end);
                        while nonce < batch_end {
                            if pow_hash(digest, nonce) <= target {
                                found.store(true, Ordering::Relaxed);
                                let _ = tx.try_send(nonce);
                                return;
                            }
                            nonce += 1;
                        }
                    }
                });
            }
        });
        drop(tx);

        match rx.try_recv() {
            Ok(nonce) => {
                debug!(nonce, min_score, "found proof-of-work nonce");
                Ok(nonce)
            }
            Err(_) => Err(Error::PowCancelled),
        }
    }
}
