//! UTXO input selection and reservation
//!
//! Candidates are fetched from the indexer without holding any lock. The
//! reservation map is only locked for the selection itself, so two
//! assemblies running at the same time never pick the same output. A
//! reservation lapses after its TTL, when the transaction fails to post, or
//! when released explicitly.

use crate::block::output::OutputId;
use crate::block::payload::{UtxoInput, MAX_INPUTS};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::node_api::indexer::spendable_basic_outputs;
use crate::node_api::responses::OutputWithMetadata;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Largest amounts first until `amount` is covered.
pub fn select_inputs(mut candidates: Vec<(OutputId, u64)>, amount: u64) -> Result<Vec<(OutputId, u64)>> {
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut total: u64 = 0;
    let mut needed = 0usize;
    for (_, value) in &candidates {
        if total >= amount {
            break;
        }
        total = total.saturating_add(*value);
        needed += 1;
    }
    if total < amount {
        return Err(Error::InsufficientFunds {
            found: total,
            required: amount,
        });
    }
    if needed > MAX_INPUTS {
        return Err(Error::TooManyInputs {
            count: needed,
            max: MAX_INPUTS,
        });
    }
    candidates.truncate(needed);
    Ok(candidates)
}

/// Outputs picked by an assembly that has not posted yet.
#[derive(Debug)]
pub struct InputReservations {
    ttl: Duration,
    reserved: Mutex<HashMap<OutputId, Instant>>,
}

impl InputReservations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_reserved(&self, output_id: &OutputId) -> bool {
        self.reserved
            .lock()
            .get(output_id)
            .map_or(false, |expires| *expires > Instant::now())
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.reserved.lock().values().filter(|e| **e > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects among the unreserved candidates without reserving.
    pub fn select(&self, candidates: Vec<(OutputId, u64)>, amount: u64) -> Result<Vec<(OutputId, u64)>> {
        let free = {
            let reserved = self.reserved.lock();
            let now = Instant::now();
            candidates
                .into_iter()
                .filter(|(id, _)| reserved.get(id).map_or(true, |e| *e <= now))
                .collect()
        };
        select_inputs(free, amount)
    }

    /// Selects among the unreserved candidates and reserves the picks in
    /// the same critical section.
    pub fn select_and_reserve(
        &self,
        candidates: Vec<(OutputId, u64)>,
        amount: u64,
    ) -> Result<Vec<(OutputId, u64)>> {
        let mut reserved = self.reserved.lock();
        let now = Instant::now();
        reserved.retain(|_, expires| *expires > now);

        let free = candidates
            .into_iter()
            .filter(|(id, _)| !reserved.contains_key(id))
            .collect();
        let selected = select_inputs(free, amount)?;
        for (id, _) in &selected {
            reserved.insert(*id, now + self.ttl);
        }
        debug!(count = selected.len(), "inputs reserved");
        Ok(selected)
    }

    /// Reserves caller chosen outputs. Fails if any is already taken.
    pub fn reserve(&self, output_ids: &[OutputId]) -> Result<()> {
        let mut reserved = self.reserved.lock();
        let now = Instant::now();
        reserved.retain(|_, expires| *expires > now);
        if let Some(taken) = output_ids.iter().find(|id| reserved.contains_key(id)) {
            return Err(Error::InvalidTransaction(format!(
                "output {} is reserved by another transaction",
                taken
            )));
        }
        for id in output_ids {
            reserved.insert(*id, now + self.ttl);
        }
        Ok(())
    }

    pub fn release_inputs(&self, output_ids: &[OutputId]) {
        let mut reserved = self.reserved.lock();
        for id in output_ids {
            reserved.remove(id);
        }
    }

    pub fn clear(&self) {
        self.reserved.lock().clear();
    }
}

impl Client {
    /// Unspent basic outputs of `addresses` without expiration, timelock or
    /// storage deposit return, deduplicated by output id.
    pub async fn spendable_outputs(&self, addresses: &[String]) -> Result<Vec<OutputWithMetadata>> {
        let mut seen = HashSet::new();
        let mut outputs = Vec::new();
        for address in addresses {
            let ids = self
                .basic_output_ids(spendable_basic_outputs(address))
                .await?
                .items;
            for output in self.get_outputs(ids).await? {
                if !output.metadata.is_spent && seen.insert(output.metadata.output_id()) {
                    outputs.push(output);
                }
            }
        }
        Ok(outputs)
    }

    /// Inputs covering `amount` from outputs of `addresses`, largest first.
    /// Reserved outputs are skipped; nothing is reserved.
    pub async fn find_inputs(&self, addresses: Vec<String>, amount: u64) -> Result<Vec<UtxoInput>> {
        let outputs = self.spendable_outputs(&addresses).await?;
        let candidates = outputs
            .iter()
            .map(|o| (o.metadata.output_id(), o.output.amount()))
            .collect();
        let selected = self.reservations().select(candidates, amount)?;
        Ok(selected.into_iter().map(|(id, _)| UtxoInput::from(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::TransactionId;

    fn candidate(byte: u8, amount: u64) -> (OutputId, u64) {
        (OutputId::new(TransactionId([byte; 32]), 0), amount)
    }

    #[test]
    fn test_largest_first() {
        let selected = select_inputs(
            vec![candidate(1, 10), candidate(2, 50), candidate(3, 30)],
            60,
        )
        .unwrap();
        assert_eq!(selected, vec![candidate(2, 50), candidate(3, 30)]);

        let err = select_inputs(vec![candidate(1, 10), candidate(2, 5)], 100).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { found: 15, required: 100 }));
    }

    #[test]
    fn test_too_many_inputs() {
        let candidates: Vec<_> = (0..=MAX_INPUTS as u8).map(|i| candidate(i, 1)).collect();
        let err = select_inputs(candidates, MAX_INPUTS as u64 + 1).unwrap_err();
        assert!(matches!(err, Error::TooManyInputs { count, .. } if count == MAX_INPUTS + 1));
    }

    #[test]
    fn test_reserved_outputs_are_skipped() {
        let reservations = InputReservations::new(Duration::from_secs(60));
        let first = reservations
            .select_and_reserve(vec![candidate(1, 100), candidate(2, 100)], 100)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(reservations.is_reserved(&first[0].0));

        let second = reservations
            .select_and_reserve(vec![candidate(1, 100), candidate(2, 100)], 100)
            .unwrap();
        assert_ne!(first[0].0, second[0].0);

        assert!(matches!(
            reservations.select_and_reserve(vec![candidate(1, 100), candidate(2, 100)], 100),
            Err(Error::InsufficientFunds { found: 0, .. })
        ));

        reservations.release_inputs(&[first[0].0]);
        assert!(!reservations.is_reserved(&first[0].0));
        assert!(reservations.reserve(&[second[0].0]).is_err());
    }

    #[test]
    fn test_reservations_expire() {
        let reservations = InputReservations::new(Duration::ZERO);
        reservations.reserve(&[candidate(1, 1).0]).unwrap();
        assert!(!reservations.is_reserved(&candidate(1, 1).0));
        assert!(reservations.is_empty());
    }
}
