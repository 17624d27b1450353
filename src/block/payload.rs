//! Block payloads: tagged data and signed transactions

use crate::block::address::Address;
use crate::block::output::{Output, OutputId, MAX_TAG_LENGTH};
use crate::block::{serde_hex, sha256, Sha256Hash, TransactionId};
use crate::error::{Error, Result};
use secp256k1::constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const MAX_INPUTS: usize = 128;
pub const MAX_OUTPUTS: usize = 128;
pub const MAX_TAGGED_DATA_LENGTH: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    Transaction(Box<TransactionPayload>),
    TaggedData(Box<TaggedDataPayload>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedDataPayload {
    #[serde(with = "serde_hex::bytes")]
    pub tag: Vec<u8>,
    #[serde(with = "serde_hex::bytes")]
    pub data: Vec<u8>,
}

impl TaggedDataPayload {
    pub fn new(tag: Vec<u8>, data: Vec<u8>) -> Result<Self> {
        if tag.len() > MAX_TAG_LENGTH {
            return Err(Error::InvalidBlock(format!(
                "tag too long: {} bytes (max: {})",
                tag.len(),
                MAX_TAG_LENGTH
            )));
        }
        if data.len() > MAX_TAGGED_DATA_LENGTH {
            return Err(Error::InvalidBlock(format!(
                "tagged data too long: {} bytes (max: {})",
                data.len(),
                MAX_TAGGED_DATA_LENGTH
            )));
        }
        Ok(Self { tag, data })
    }
}

/// Reference to an unspent output consumed by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInput {
    pub transaction_id: TransactionId,
    pub transaction_output_index: u16,
}

impl UtxoInput {
    pub fn output_id(&self) -> OutputId {
        OutputId::new(self.transaction_id, self.transaction_output_index)
    }
}

impl From<OutputId> for UtxoInput {
    fn from(id: OutputId) -> Self {
        Self {
            transaction_id: id.transaction_id,
            transaction_output_index: id.index,
        }
    }
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEssence {
    #[serde(with = "serde_hex::string_u64")]
    pub network_id: u64,
    pub inputs: Vec<UtxoInput>,
    /// Commits to the outputs being consumed so signers sign what they see.
    #[serde(with = "serde_hex::fixed")]
    pub inputs_commitment: Sha256Hash,
    pub outputs: Vec<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TaggedDataPayload>,
}

impl TransactionEssence {
    pub fn new(
        network_id: u64,
        inputs: Vec<UtxoInput>,
        consumed_outputs: &[Output],
        outputs: Vec<Output>,
        payload: Option<TaggedDataPayload>,
    ) -> Result<Self> {
        let essence = Self {
            network_id,
            inputs,
            inputs_commitment: inputs_commitment(consumed_outputs)?,
            outputs,
            payload,
        };
        essence.validate_syntax()?;
        Ok(essence)
    }

    pub fn hash(&self) -> Result<Sha256Hash> {
        Ok(sha256(bincode::serialize(self)?))
    }

    pub fn validate_syntax(&self) -> Result<()> {
        if self.inputs.is_empty() || self.inputs.len() > MAX_INPUTS {
            return Err(Error::InvalidTransaction(format!(
                "input count {} outside 1..={}",
                self.inputs.len(),
                MAX_INPUTS
            )));
        }
        if self.outputs.is_empty() || self.outputs.len() > MAX_OUTPUTS {
            return Err(Error::InvalidTransaction(format!(
                "output count {} outside 1..={}",
                self.outputs.len(),
                MAX_OUTPUTS
            )));
        }

        let mut seen_inputs = HashMap::new();
        for (index, input) in self.inputs.iter().enumerate() {
            if let Some(first) = seen_inputs.insert(input.output_id(), index) {
                return Err(Error::InvalidTransaction(format!(
                    "double spend: output {} is used by inputs {} and {}",
                    input.output_id(),
                    first,
                    index
                )));
            }
        }

        for output in &self.outputs {
            output.validate()?;
        }
        self.outputs
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.amount()))
            .ok_or_else(|| Error::InvalidTransaction("output amounts overflow".to_string()))?;
        Ok(())
    }
}

/// SHA-256 over the SHA-256 of each consumed output, in input order.
pub fn inputs_commitment(consumed_outputs: &[Output]) -> Result<Sha256Hash> {
    let mut hasher = Sha256::new();
    for output in consumed_outputs {
        hasher.update(sha256(bincode::serialize(output)?));
    }
    Ok(hasher.finalize().into())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureUnlock {
    #[serde(with = "serde_hex::fixed")]
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    #[serde(with = "serde_hex::fixed")]
    pub signature: [u8; COMPACT_SIGNATURE_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Unlock {
    Signature(SignatureUnlock),
    Reference { reference: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub essence: TransactionEssence,
    pub unlocks: Vec<Unlock>,
}

impl TransactionPayload {
    pub fn id(&self) -> Result<TransactionId> {
        Ok(TransactionId(sha256(bincode::serialize(self)?)))
    }

    /// Checks every unlock against the address owning the matching input.
    ///
    /// `owners[i]` is the owning address of `essence.inputs[i]`.
    pub fn verify_unlocks(&self, owners: &[Address]) -> Result<()> {
        if owners.len() != self.essence.inputs.len() || self.unlocks.len() != owners.len() {
            return Err(Error::InvalidTransaction(format!(
                "{} unlocks for {} inputs",
                self.unlocks.len(),
                self.essence.inputs.len()
            )));
        }
        let essence_hash = self.essence.hash()?;
        for (index, (unlock, owner)) in self.unlocks.iter().zip(owners).enumerate() {
            match unlock {
                Unlock::Signature(sig) => {
                    let public_key = secp256k1::PublicKey::from_slice(&sig.public_key)?;
                    if Address::from_public_key(&public_key) != *owner {
                        return Err(Error::InvalidTransaction(format!(
                            "unlock {} signed by a key that does not own the input",
                            index
                        )));
                    }
                    crate::crypto::verify_unlock(sig, &essence_hash)?;
                }
                Unlock::Reference { reference } => {
                    let target = *reference as usize;
                    let valid = target < index
                        && matches!(self.unlocks[target], Unlock::Signature(_))
                        && owners[target] == *owner;
                    if !valid {
                        return Err(Error::InvalidTransaction(format!(
                            "unlock {} references invalid unlock {}",
                            index, reference
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::output::{BasicOutputBuilder, UnlockCondition};

    fn basic(amount: u64) -> Output {
        BasicOutputBuilder::new_with_amount(amount)
            .add_unlock_condition(UnlockCondition::Address(Address::Key([1; 32])))
            .finish()
            .unwrap()
    }

    fn input(byte: u8, index: u16) -> UtxoInput {
        UtxoInput {
            transaction_id: TransactionId([byte; 32]),
            transaction_output_index: index,
        }
    }

    #[test]
    fn test_double_spend_rejected() {
        let err = TransactionEssence::new(
            1,
            vec![input(1, 0), input(1, 0)],
            &[basic(5), basic(5)],
            vec![basic(10)],
            None,
        );
        assert!(matches!(err, Err(Error::InvalidTransaction(msg)) if msg.contains("double spend")));
    }

    #[test]
    fn test_empty_outputs_rejected() {
        let err = TransactionEssence::new(1, vec![input(1, 0)], &[basic(5)], vec![], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_inputs_commitment_tracks_consumed_outputs() {
        let a = inputs_commitment(&[basic(5)]).unwrap();
        let b = inputs_commitment(&[basic(6)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_essence_hash_is_stable() {
        let essence =
            TransactionEssence::new(7, vec![input(2, 1)], &[basic(5)], vec![basic(5)], None).unwrap();
        assert_eq!(essence.hash().unwrap(), essence.clone().hash().unwrap());
    }

    #[test]
    fn test_unlock_json_shape() {
        let unlock = Unlock::Reference { reference: 3 };
        let json = serde_json::to_value(&unlock).unwrap();
        assert_eq!(json["type"], "reference");
        assert_eq!(json["reference"], 3);
    }
}
