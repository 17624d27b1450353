use crate::block::output::RentStructure;
use crate::block::{serde_hex, sha256};
use crate::config::ClientConfig;
use crate::node_api::responses::ProtocolParameters;
use serde::{Deserialize, Serialize};

/// Protocol parameters and PoW policy shared by every request.
///
/// Written by the node synchronizer, read everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_name: String,
    #[serde(with = "serde_hex::string_u64")]
    pub network_id: u64,
    pub bech32_hrp: String,
    pub min_pow_score: u32,
    pub local_pow: bool,
    pub fallback_to_local_pow: bool,
    /// Seconds a local miner works on one set of parents.
    pub tips_interval: u64,
    pub rent_structure: RentStructure,
    #[serde(with = "serde_hex::string_u64")]
    pub token_supply: u64,
    #[serde(default)]
    pub latest_milestone_timestamp: Option<u32>,
}

/// First eight bytes of SHA-256(`network_name`), little endian.
pub fn network_id_from_name(network_name: &str) -> u64 {
    let digest = sha256(network_name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

impl NetworkInfo {
    pub fn from_config(config: &ClientConfig) -> Self {
        let params = &config.network_info;
        Self {
            network_name: params.network_name.clone(),
            network_id: network_id_from_name(&params.network_name),
            bech32_hrp: params.bech32_hrp.clone(),
            min_pow_score: params.min_pow_score,
            local_pow: config.pow.local_pow,
            fallback_to_local_pow: config.pow.fallback_to_local_pow,
            tips_interval: config.pow.tips_interval.as_secs(),
            rent_structure: params.rent_structure,
            token_supply: params.token_supply,
            latest_milestone_timestamp: None,
        }
    }

    pub(crate) fn update_from_protocol(&mut self, protocol: &ProtocolParameters, latest_timestamp: Option<u32>) {
        self.network_name = protocol.network_name.clone();
        self.network_id = network_id_from_name(&protocol.network_name);
        self.bech32_hrp = protocol.bech32_hrp.clone();
        self.min_pow_score = protocol.min_pow_score;
        self.rent_structure = protocol.rent_structure;
        self.token_supply = protocol.token_supply;
        if latest_timestamp.is_some() {
            self.latest_milestone_timestamp = latest_timestamp;
        }
    }
}
