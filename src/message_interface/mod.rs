//! Message interface for language bindings
//!
//! Bindings send a serialized [`Message`] and get a serialized [`Response`]
//! back. Dispatch is a single `match` over the closed command set; every
//! failure is folded into an error envelope carrying the message and the
//! [`crate::error::ErrorKind`].

mod message;
mod response;

pub use message::{Message, MnemonicString};
pub use response::{Response, ResponsePayload};

use crate::block::output::{AliasOutputBuilder, BasicOutputBuilder, NftOutputBuilder, Output};
use crate::block::serde_hex;
use crate::client::{Client, ClientBuilder};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{Event, Topic};
use crate::secret::{SecretManage, SecretManager};
use crate::utils;
use tracing::debug;

fn render(response: Response, id: Option<serde_json::Value>) -> String {
    let reply = serde_json::to_value(&response).map(|mut reply| {
        if let (Some(id), Some(fields)) = (id, reply.as_object_mut()) {
            fields.insert("id".to_string(), id);
        }
        reply
    });
    match reply {
        Ok(reply) => reply.to_string(),
        Err(e) => serde_json::json!({
            "type": "Error",
            "payload": e.to_string(),
            "kind": ErrorKind::Internal,
        })
        .to_string(),
    }
}

fn parse_amount(amount: &str) -> Result<u64> {
    amount
        .parse()
        .map_err(|_| Error::InvalidOutput(format!("invalid amount {:?}", amount)))
}

#[derive(Clone, Debug)]
pub struct MessageHandler {
    client: Client,
}

impl MessageHandler {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from binding options, a JSON [`crate::config::ClientConfig`].
    pub async fn from_options(options: &str) -> Result<Self> {
        let client = ClientBuilder::from_json(options)?.finish().await?;
        Ok(Self::with_client(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn send_message(&self, message: Message) -> Response {
        debug!(?message, "handling message");
        match self.handle(message).await {
            Ok(payload) => Response::Success { payload },
            Err(error) => {
                debug!(%error, "message failed");
                Response::from(error)
            }
        }
    }

    /// Envelope in, envelope out. Never fails: undecodable input becomes
    /// an error envelope.
    pub async fn handle_json(&self, message: &str) -> String {
        render(self.respond(serde_json::from_str::<Message>(message)).await, None)
    }

    /// Like [`Self::handle_json`], but a top-level `"id"` member of the
    /// request is copied into the reply so replies to commands handled
    /// concurrently can be matched to their requests.
    pub async fn handle_tagged_json(&self, message: &str) -> String {
        let mut request: serde_json::Value = match serde_json::from_str(message) {
            Ok(request) => request,
            Err(e) => return render(Response::from(Error::Json(e)), None),
        };
        let id = request.as_object_mut().and_then(|fields| fields.remove("id"));
        render(self.respond(serde_json::from_value::<Message>(request)).await, id)
    }

    async fn respond(&self, message: serde_json::Result<Message>) -> Response {
        match message {
            Ok(message) => self.send_message(message).await,
            Err(e) => Response::from(Error::Json(e)),
        }
    }

    /// Subscribes `callback` to `topics` on the event feed.
    pub async fn listen<F>(&self, topics: Vec<Topic>, callback: F) -> Result<()>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.client.events().subscribe(topics, callback).await
    }

    async fn handle(&self, message: Message) -> Result<ResponsePayload> {
        let client = &self.client;
        Ok(match message {
            Message::BuildBasicOutput {
                amount,
                unlock_conditions,
                features,
            } => {
                let rent = client.get_network_info().rent_structure;
                let builder = match amount {
                    Some(amount) => BasicOutputBuilder::new_with_amount(parse_amount(&amount)?),
                    None => BasicOutputBuilder::new_with_minimum_storage_deposit(rent),
                };
                let output = builder
                    .with_unlock_conditions(unlock_conditions)
                    .with_features(features.unwrap_or_default())
                    .with_rent_check(rent)
                    .finish()?;
                ResponsePayload::BuiltOutput(checked(output)?)
            }
            Message::BuildAliasOutput {
                amount,
                alias_id,
                state_index,
                state_metadata,
                foundry_counter,
                unlock_conditions,
                features,
                immutable_features,
            } => {
                let rent = client.get_network_info().rent_structure;
                let mut builder = match amount {
                    Some(amount) => AliasOutputBuilder::new_with_amount(parse_amount(&amount)?, alias_id),
                    None => AliasOutputBuilder::new_with_minimum_storage_deposit(rent, alias_id),
                };
                if let Some(state_index) = state_index {
                    builder = builder.with_state_index(state_index);
                }
                if let Some(metadata) = state_metadata {
                    builder = builder.with_state_metadata(serde_hex::decode(&metadata)?);
                }
                if let Some(counter) = foundry_counter {
                    builder = builder.with_foundry_counter(counter);
                }
                let output = builder
                    .with_unlock_conditions(unlock_conditions)
                    .with_features(features.unwrap_or_default())
                    .with_immutable_features(immutable_features.unwrap_or_default())
                    .with_rent_check(rent)
                    .finish()?;
                ResponsePayload::BuiltOutput(checked(output)?)
            }
            Message::BuildNftOutput {
                amount,
                nft_id,
                unlock_conditions,
                features,
                immutable_features,
            } => {
                let rent = client.get_network_info().rent_structure;
                let builder = match amount {
                    Some(amount) => NftOutputBuilder::new_with_amount(parse_amount(&amount)?, nft_id),
                    None => NftOutputBuilder::new_with_minimum_storage_deposit(rent, nft_id),
                };
                let output = builder
                    .with_unlock_conditions(unlock_conditions)
                    .with_features(features.unwrap_or_default())
                    .with_immutable_features(immutable_features.unwrap_or_default())
                    .with_rent_check(rent)
                    .finish()?;
                ResponsePayload::BuiltOutput(checked(output)?)
            }
            Message::ClearListeners { topics } => {
                client.events().unsubscribe(&topics)?;
                ResponsePayload::Ok
            }
            Message::GenerateAddresses {
                secret_manager,
                options,
            } => {
                let manager = SecretManager::try_from(&secret_manager)?;
                let hrp = options.bech32_hrp.clone().unwrap_or_else(|| client.get_bech32_hrp());
                let addresses = manager
                    .generate_addresses(
                        options.coin_type,
                        options.account_index,
                        options.range.clone(),
                        options.internal,
                        options.options,
                    )
                    .await?
                    .iter()
                    .map(|address| address.to_bech32(&hrp))
                    .collect::<Result<Vec<_>>>()?;
                ResponsePayload::GeneratedAddresses(addresses)
            }
            Message::BuildAndPostBlock {
                secret_manager,
                options,
            } => {
                let manager = secret_manager.as_ref().map(SecretManager::try_from).transpose()?;
                let block = client
                    .build_and_post_block(manager.as_ref(), options.unwrap_or_default())
                    .await?;
                ResponsePayload::Block(block)
            }
            Message::GetNode => ResponsePayload::Node(client.get_node()?),
            Message::GetNetworkInfo => ResponsePayload::NetworkInfo(client.get_network_info()),
            Message::GetNetworkId => ResponsePayload::NetworkId(client.get_network_id().to_string()),
            Message::GetBech32Hrp => ResponsePayload::Bech32Hrp(client.get_bech32_hrp()),
            Message::GetMinPowScore => ResponsePayload::MinPowScore(client.get_min_pow_score()),
            Message::GetTipsInterval => ResponsePayload::TipsInterval(client.get_tips_interval()),
            Message::GetLocalPow => ResponsePayload::LocalPow(client.get_local_pow()),
            Message::GetFallbackToLocalPow => {
                ResponsePayload::FallbackToLocalPow(client.get_fallback_to_local_pow())
            }
            Message::UnhealthyNodes => ResponsePayload::UnhealthyNodes(client.unhealthy_nodes()),
            Message::GetLedgerNanoStatus { is_simulator } => {
                let ledger = crate::secret::ledger::LedgerSecretManager::new(is_simulator);
                ResponsePayload::LedgerNanoStatus(ledger.get_ledger_nano_status().await)
            }
            Message::PrepareTransaction {
                secret_manager,
                options,
            } => {
                let manager = secret_manager.as_ref().map(SecretManager::try_from).transpose()?;
                ResponsePayload::PreparedTransactionData(client.prepare_transaction(manager.as_ref(), options).await?)
            }
            Message::SignTransaction {
                secret_manager,
                prepared_transaction_data,
                range,
            } => {
                let manager = SecretManager::try_from(&secret_manager)?;
                ResponsePayload::SignedTransaction(
                    client
                        .sign_transaction(&manager, &prepared_transaction_data, range)
                        .await?,
                )
            }
            Message::StoreMnemonic {
                secret_manager,
                mnemonic,
            } => {
                SecretManager::try_from(&secret_manager)?.store_mnemonic(mnemonic.as_str())?;
                ResponsePayload::Ok
            }
            Message::PostBlockPayload { payload } => ResponsePayload::Block(client.post_block_payload(payload).await?),
            Message::GetHealth { url } => ResponsePayload::Health(client.get_health(&url).await?),
            Message::GetNodeInfo { url, auth } => ResponsePayload::NodeInfo(client.get_node_info(&url, auth).await?),
            Message::GetInfo => ResponsePayload::Info(client.get_info().await?),
            Message::GetPeers => ResponsePayload::Peers(client.get_peers().await?),
            Message::GetTips => ResponsePayload::Tips(client.get_tips().await?),
            Message::PostBlockJson { block } => ResponsePayload::BlockId(client.post_block_json(block).await?),
            Message::GetBlock { block_id } => ResponsePayload::Block(client.get_block(&block_id).await?),
            Message::GetBlockMetadata { block_id } => {
                ResponsePayload::BlockMetadata(client.get_block_metadata(&block_id).await?)
            }
            Message::GetBlockChildren { block_id } => {
                ResponsePayload::BlockChildren(client.get_block_children(&block_id).await?)
            }
            Message::GetMilestoneById { milestone_id } => {
                ResponsePayload::Milestone(client.get_milestone_by_id(&milestone_id).await?)
            }
            Message::GetMilestoneByIndex { index } => {
                ResponsePayload::Milestone(client.get_milestone_by_index(index).await?)
            }
            Message::GetUtxoChangesById { milestone_id } => {
                ResponsePayload::UtxoChanges(client.get_utxo_changes_by_id(&milestone_id).await?)
            }
            Message::GetUtxoChangesByIndex { index } => {
                ResponsePayload::UtxoChanges(client.get_utxo_changes_by_index(index).await?)
            }
            Message::GetOutput { output_id } => ResponsePayload::Output(client.get_output(&output_id).await?),
            Message::GetOutputMetadata { output_id } => {
                ResponsePayload::OutputMetadata(client.get_output_metadata(&output_id).await?)
            }
            Message::GetIncludedBlock { transaction_id } => {
                ResponsePayload::Block(client.get_included_block(&transaction_id).await?)
            }
            Message::BasicOutputIds { query_parameters } => {
                ResponsePayload::OutputIdsResponse(client.basic_output_ids(query_parameters).await?)
            }
            Message::AliasOutputIds { query_parameters } => {
                ResponsePayload::OutputIdsResponse(client.alias_output_ids(query_parameters).await?)
            }
            Message::AliasOutputId { alias_id } => ResponsePayload::OutputId(client.alias_output_id(&alias_id).await?),
            Message::NftOutputIds { query_parameters } => {
                ResponsePayload::OutputIdsResponse(client.nft_output_ids(query_parameters).await?)
            }
            Message::NftOutputId { nft_id } => ResponsePayload::OutputId(client.nft_output_id(&nft_id).await?),
            Message::GetOutputs { output_ids } => ResponsePayload::Outputs(client.get_outputs(output_ids).await?),
            Message::TryGetOutputs { output_ids } => {
                ResponsePayload::Outputs(client.try_get_outputs(output_ids).await?)
            }
            Message::FindBlocks { block_ids } => ResponsePayload::Blocks(client.find_blocks(&block_ids).await?),
            Message::Retry { block_id } => ResponsePayload::Retried(client.retry(&block_id).await?),
            Message::RetryUntilIncluded {
                block_id,
                interval,
                max_attempts,
            } => ResponsePayload::RetryUntilIncludedSuccessful(
                client.retry_until_included(&block_id, interval, max_attempts).await?,
            ),
            Message::FindInputs { addresses, amount } => {
                ResponsePayload::Inputs(client.find_inputs(addresses, amount).await?)
            }
            Message::FindOutputs { output_ids, addresses } => {
                ResponsePayload::Outputs(client.find_outputs(&output_ids, &addresses).await?)
            }
            Message::Reattach { block_id } => ResponsePayload::Reattached(client.reattach(&block_id).await?),
            Message::ReattachUnchecked { block_id } => {
                ResponsePayload::Reattached(client.reattach_unchecked(&block_id).await?)
            }
            Message::Promote { block_id } => ResponsePayload::Promoted(client.promote(&block_id).await?),
            Message::PromoteUnchecked { block_id } => {
                ResponsePayload::Promoted(client.promote_unchecked(&block_id).await?)
            }
            Message::Bech32ToHex { bech32 } => ResponsePayload::Bech32ToHex(utils::bech32_to_hex(&bech32)?),
            Message::HexToBech32 { hex, bech32_hrp } => {
                let hrp = bech32_hrp.unwrap_or_else(|| client.get_bech32_hrp());
                ResponsePayload::Bech32Address(utils::hex_to_bech32(&hex, &hrp)?)
            }
            Message::HexPublicKeyToBech32Address { hex, bech32_hrp } => {
                let hrp = bech32_hrp.unwrap_or_else(|| client.get_bech32_hrp());
                ResponsePayload::Bech32Address(utils::hex_public_key_to_bech32_address(&hex, &hrp)?)
            }
            Message::ParseBech32Address { address } => {
                ResponsePayload::ParsedBech32Address(utils::parse_bech32_address(&address)?)
            }
            Message::IsAddressValid { address } => ResponsePayload::IsAddressValid(utils::is_address_valid(&address)),
            Message::GenerateMnemonic => ResponsePayload::GeneratedMnemonic(utils::generate_mnemonic()?),
            Message::MnemonicToHexSeed { mnemonic } => {
                ResponsePayload::MnemonicHexSeed(utils::mnemonic_to_hex_seed(mnemonic.as_str())?)
            }
            Message::BlockId { block } => ResponsePayload::BlockId(utils::block_id(&block)?),
            Message::TransactionId { payload } => ResponsePayload::TransactionId(utils::transaction_id(&payload)?),
            Message::HashTransactionEssence { essence } => {
                ResponsePayload::TransactionEssenceHash(serde_hex::encode(utils::hash_transaction_essence(&essence)?))
            }
        })
    }
}

fn checked(output: Output) -> Result<Output> {
    output.validate()?;
    Ok(output)
}
