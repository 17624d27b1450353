//! Transaction assembly, signing and posting

use crate::block::address::Address;
use crate::block::output::{BasicOutputBuilder, Output, OutputId, UnlockCondition};
use crate::block::payload::{Payload, TaggedDataPayload, TransactionEssence, TransactionPayload, UtxoInput};
use crate::block::{serde_hex, Block, BlockId};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::node_api::responses::OutputWithMetadata;
use crate::secret::types::{Chain, InputSigningData, PreparedTransactionData, RemainderData, TRINITY_COIN_TYPE};
use crate::secret::{SecretManage, SecretManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, info, warn};

fn default_coin_type() -> u32 {
    TRINITY_COIN_TYPE
}

fn default_input_range() -> Range<u32> {
    0..20
}

/// What to build. Without outputs a block carries tagged data, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareTransactionOptions {
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// Bech32 address receiving the remainder.
    #[serde(default)]
    pub custom_remainder_address: Option<String>,
    /// Inputs to spend instead of searching the wallet's addresses.
    #[serde(default)]
    pub inputs: Option<Vec<UtxoInput>>,
    #[serde(default = "default_input_range")]
    pub input_range: Range<u32>,
    #[serde(default = "default_coin_type")]
    pub coin_type: u32,
    #[serde(default)]
    pub account_index: u32,
    /// Hex encoded tag of the tagged data payload.
    #[serde(default)]
    pub tag: Option<String>,
    /// Hex encoded data of the tagged data payload.
    #[serde(default)]
    pub data: Option<String>,
    /// Keeps the parents fixed instead of following the tips.
    #[serde(default)]
    pub parents: Option<Vec<BlockId>>,
}

impl Default for PrepareTransactionOptions {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            custom_remainder_address: None,
            inputs: None,
            input_range: default_input_range(),
            coin_type: default_coin_type(),
            account_index: 0,
            tag: None,
            data: None,
            parents: None,
        }
    }
}

impl PrepareTransactionOptions {
    fn tagged_data(&self) -> Result<Option<TaggedDataPayload>> {
        if self.tag.is_none() && self.data.is_none() {
            return Ok(None);
        }
        let decode = |field: &Option<String>| field.as_deref().map(serde_hex::decode).transpose();
        let tag = decode(&self.tag)?.unwrap_or_default();
        let data = decode(&self.data)?.unwrap_or_default();
        Ok(Some(TaggedDataPayload::new(tag, data)?))
    }
}

impl Client {
    /// Chains of the public and internal addresses over `range`.
    async fn address_chains(
        &self,
        secret_manager: &SecretManager,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
    ) -> Result<Vec<(Address, Chain)>> {
        let mut chains = Vec::new();
        for internal in [false, true] {
            let addresses = secret_manager
                .generate_addresses(coin_type, account_index, range.clone(), internal, None)
                .await?;
            chains.extend(
                range
                    .clone()
                    .zip(addresses)
                    .map(|(index, address)| (address, Chain::new(coin_type, account_index, internal, index))),
            );
        }
        Ok(chains)
    }

    /// Selects inputs, adds a remainder and builds the essence. The
    /// selected inputs stay reserved until posted, released or expired.
    pub async fn prepare_transaction(
        &self,
        secret_manager: Option<&SecretManager>,
        options: PrepareTransactionOptions,
    ) -> Result<PreparedTransactionData> {
        if options.outputs.is_empty() {
            return Err(Error::MissingParameter("outputs"));
        }
        for output in &options.outputs {
            output.validate()?;
        }
        let required = options
            .outputs
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.amount()))
            .ok_or_else(|| Error::InvalidTransaction("output amounts overflow".to_string()))?;
        let remainder_address = options
            .custom_remainder_address
            .as_deref()
            .map(|bech32| Address::try_from_bech32(bech32).map(|(_, address)| address))
            .transpose()?;
        let payload = options.tagged_data()?;

        let wallet = match secret_manager {
            Some(manager) => {
                self.address_chains(manager, options.coin_type, options.account_index, options.input_range.clone())
                    .await?
            }
            None => Vec::new(),
        };
        let chains: HashMap<Address, Chain> = wallet.iter().copied().collect();

        let selected: Vec<OutputWithMetadata> = match &options.inputs {
            Some(inputs) => {
                let ids: Vec<OutputId> = inputs.iter().map(UtxoInput::output_id).collect();
                let outputs = self.get_outputs(ids.clone()).await?;
                if let Some(spent) = outputs.iter().find(|o| o.metadata.is_spent) {
                    return Err(Error::InvalidTransaction(format!(
                        "input {} is already spent",
                        spent.metadata.output_id()
                    )));
                }
                self.reservations().reserve(&ids)?;
                outputs
            }
            None => {
                if secret_manager.is_none() {
                    return Err(Error::MissingParameter("secretManager"));
                }
                let hrp = self.get_bech32_hrp();
                let addresses = wallet
                    .iter()
                    .map(|(address, _)| address.to_bech32(&hrp))
                    .collect::<Result<Vec<_>>>()?;
                let mut available: HashMap<OutputId, OutputWithMetadata> = self
                    .spendable_outputs(&addresses)
                    .await?
                    .into_iter()
                    .map(|o| (o.metadata.output_id(), o))
                    .collect();
                let candidates = available
                    .iter()
                    .map(|(id, o)| (*id, o.output.amount()))
                    .collect();
                self.reservations()
                    .select_and_reserve(candidates, required)?
                    .into_iter()
                    .filter_map(|(id, _)| available.remove(&id))
                    .collect()
            }
        };

        let reserved: Vec<OutputId> = selected.iter().map(|o| o.metadata.output_id()).collect();
        let assembled = self.assemble(selected, &chains, required, remainder_address, payload, options.outputs);
        if assembled.is_err() {
            self.reservations().release_inputs(&reserved);
        }
        assembled
    }

    fn assemble(
        &self,
        selected: Vec<OutputWithMetadata>,
        chains: &HashMap<Address, Chain>,
        required: u64,
        remainder_address: Option<Address>,
        payload: Option<TaggedDataPayload>,
        mut outputs: Vec<Output>,
    ) -> Result<PreparedTransactionData> {
        let mut inputs_data = selected
            .into_iter()
            .map(|o| {
                let owner = o.output.owning_address().copied();
                InputSigningData {
                    chain: owner.and_then(|a| chains.get(&a).copied()),
                    output: o.output,
                    output_metadata: o.metadata,
                }
            })
            .collect::<Vec<_>>();
        inputs_data.sort_by_key(InputSigningData::output_id);

        let found = inputs_data
            .iter()
            .try_fold(0u64, |sum, i| sum.checked_add(i.output.amount()))
            .ok_or_else(|| Error::InvalidTransaction("input amounts overflow".to_string()))?;
        if found < required {
            return Err(Error::InsufficientFunds { found, required });
        }

        let mut remainder = None;
        if found > required {
            let address = match remainder_address {
                Some(address) => address,
                None => inputs_data
                    .first()
                    .map(InputSigningData::owning_address)
                    .transpose()?
                    .ok_or(Error::MissingParameter("inputs"))?,
            };
            let output = BasicOutputBuilder::new_with_amount(found - required)
                .add_unlock_condition(UnlockCondition::Address(address))
                .finish()?;
            outputs.push(output.clone());
            remainder = Some(RemainderData {
                output,
                chain: chains.get(&address).copied(),
                address,
            });
        }

        let inputs = inputs_data.iter().map(|i| UtxoInput::from(i.output_id())).collect();
        let consumed: Vec<Output> = inputs_data.iter().map(|i| i.output.clone()).collect();
        let essence = TransactionEssence::new(self.get_network_id(), inputs, &consumed, outputs, payload)?;
        debug!(
            inputs = inputs_data.len(),
            outputs = essence.outputs.len(),
            remainder = found - required,
            "transaction prepared"
        );
        Ok(PreparedTransactionData {
            essence,
            inputs_data,
            remainder,
        })
    }

    /// Signs `prepared`. Without `range`, it spans the highest address
    /// index known from the inputs, or the default range.
    pub async fn sign_transaction(
        &self,
        secret_manager: &SecretManager,
        prepared: &PreparedTransactionData,
        range: Option<Range<u32>>,
    ) -> Result<TransactionPayload> {
        let known = prepared.inputs_data.iter().filter_map(|i| i.chain);
        let first = known.clone().next();
        let coin_type = first.map_or(TRINITY_COIN_TYPE, |c| c.coin_type);
        let account_index = first.map_or(0, |c| c.account_index);
        let range = range.unwrap_or_else(|| {
            let end = known
                .map(|c| c.address_index + 1)
                .max()
                .unwrap_or(0)
                .max(default_input_range().end);
            0..end
        });
        secret_manager
            .sign_transaction(prepared, coin_type, account_index, range)
            .await
    }

    /// Prepares, signs and posts a transaction when `options` has outputs,
    /// otherwise posts a tagged data block, or an empty one.
    pub async fn build_and_post_block(
        &self,
        secret_manager: Option<&SecretManager>,
        options: PrepareTransactionOptions,
    ) -> Result<Block> {
        if options.outputs.is_empty() {
            let payload = options
                .tagged_data()?
                .map(|tagged| Payload::TaggedData(Box::new(tagged)));
            return Ok(self.submit_block(options.parents, payload).await?.1);
        }

        let manager = secret_manager.ok_or(Error::MissingParameter("secretManager"))?;
        let range = options.input_range.clone();
        let parents = options.parents.clone();
        let prepared = self.prepare_transaction(Some(manager), options).await?;
        let reserved: Vec<OutputId> = prepared.inputs_data.iter().map(InputSigningData::output_id).collect();

        let posted = async {
            let signed = self.sign_transaction(manager, &prepared, Some(range)).await?;
            let transaction_id = signed.id()?;
            let (block_id, block) = self
                .submit_block(parents, Some(Payload::Transaction(Box::new(signed))))
                .await?;
            info!(%block_id, %transaction_id, "transaction posted");
            Ok::<_, Error>(block)
        }
        .await;
        if let Err(e) = &posted {
            warn!(error = %e, "transaction not posted, releasing its inputs");
            self.reservations().release_inputs(&reserved);
        }
        posted
    }
}
