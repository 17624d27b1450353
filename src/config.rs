//! Configuration management for the TrinityChain client
//!
//! Options are read once from TOML (or JSON handed over by a binding) and
//! are not reconfigurable for the lifetime of a client. Durations use the
//! human-readable form understood by `humantime`, e.g. `"15s"` or `"1m"`.

use crate::block::output::RentStructure;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REMOTE_POW_TIMEOUT: Duration = Duration::from_secs(100);
pub const DEFAULT_NODE_SYNC_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TIPS_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_QUORUM_SIZE: usize = 3;
pub const DEFAULT_QUORUM_THRESHOLD: usize = 66;
pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 256;
pub const DEFAULT_INPUT_RESERVATION_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_USER_AGENT: &str = concat!("trinity-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub primary_node: Option<NodeConfig>,
    #[serde(default)]
    pub primary_pow_node: Option<NodeConfig>,
    #[serde(default)]
    pub ignore_node_health: bool,
    #[serde(default = "default_true")]
    pub node_sync_enabled: bool,
    #[serde(default = "default_node_sync_interval", with = "duration_serde")]
    pub node_sync_interval: Duration,
    #[serde(default = "default_api_timeout", with = "duration_serde")]
    pub api_timeout: Duration,
    #[serde(default = "default_remote_pow_timeout", with = "duration_serde")]
    pub remote_pow_timeout: Duration,
    #[serde(default)]
    pub quorum: QuorumConfig,
    #[serde(default)]
    pub pow: PowConfig,
    #[serde(default)]
    pub offline: bool,
    /// Protocol parameters used until the first sync, and forever when offline.
    #[serde(default)]
    pub network_info: NetworkInfoConfig,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,
    #[serde(default = "default_input_reservation_ttl", with = "duration_serde")]
    pub input_reservation_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            primary_node: None,
            primary_pow_node: None,
            ignore_node_health: false,
            node_sync_enabled: true,
            node_sync_interval: DEFAULT_NODE_SYNC_INTERVAL,
            api_timeout: DEFAULT_API_TIMEOUT,
            remote_pow_timeout: DEFAULT_REMOTE_POW_TIMEOUT,
            quorum: QuorumConfig::default(),
            pow: PowConfig::default(),
            offline: false,
            network_info: NetworkInfoConfig::default(),
            user_agent: default_user_agent(),
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
            input_reservation_ttl: DEFAULT_INPUT_RESERVATION_TTL,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.offline && self.nodes.is_empty() && self.primary_node.is_none() {
            return Err(Error::Config(
                "at least one node must be configured unless offline".to_string(),
            ));
        }
        if self.quorum.min_quorum_size == 0 {
            return Err(Error::Config("quorum.min_quorum_size must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.quorum.threshold) {
            return Err(Error::Config(format!(
                "quorum.threshold must be a percentage in 1..=100, got {}",
                self.quorum.threshold
            )));
        }
        if self.pow.worker_count == Some(0) {
            return Err(Error::Config("pow.worker_count must be at least 1".to_string()));
        }
        for node in self.all_nodes() {
            reqwest::Url::parse(&node.url)
                .map_err(|e| Error::Config(format!("invalid node url {}: {}", node.url, e)))?;
        }
        Ok(())
    }

    pub(crate) fn all_nodes(&self) -> impl Iterator<Item = &NodeConfig> {
        self.nodes
            .iter()
            .chain(self.primary_node.iter())
            .chain(self.primary_pow_node.iter())
    }
}

/// A node as written in configuration: either a bare URL or a table.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "NodeConfigRepr")]
pub struct NodeConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<NodeAuth>,
    pub disabled: bool,
}

impl NodeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
            disabled: false,
        }
    }

    pub fn with_auth(mut self, auth: NodeAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl core::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("url", &self.url)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeConfigRepr {
    Url(String),
    Full {
        url: String,
        #[serde(default)]
        auth: Option<NodeAuth>,
        #[serde(default)]
        disabled: bool,
    },
}

impl From<NodeConfigRepr> for NodeConfig {
    fn from(repr: NodeConfigRepr) -> Self {
        match repr {
            NodeConfigRepr::Url(url) => NodeConfig::new(url),
            NodeConfigRepr::Full {
                url,
                auth,
                disabled,
            } => NodeConfig {
                url,
                auth,
                disabled,
            },
        }
    }
}

/// Credentials sent to a node: a bearer token, HTTP basic auth, or both.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_name_pwd: Option<(String, String)>,
}

impl core::fmt::Debug for NodeAuth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeAuth")
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field(
                "basic_auth_name_pwd",
                &self.basic_auth_name_pwd.as_ref().map(|(name, _)| name),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_quorum_size")]
    pub min_quorum_size: usize,
    /// Percentage of respondents that must agree.
    #[serde(default = "default_quorum_threshold")]
    pub threshold: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_quorum_size: DEFAULT_MIN_QUORUM_SIZE,
            threshold: DEFAULT_QUORUM_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowConfig {
    #[serde(default = "default_true")]
    pub local_pow: bool,
    #[serde(default = "default_true")]
    pub fallback_to_local_pow: bool,
    /// Defaults to the available parallelism.
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default = "default_tips_interval", with = "duration_serde")]
    pub tips_interval: Duration,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            local_pow: true,
            fallback_to_local_pow: true,
            worker_count: None,
            tips_interval: DEFAULT_TIPS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfoConfig {
    #[serde(default = "default_network_name")]
    pub network_name: String,
    #[serde(default = "default_bech32_hrp")]
    pub bech32_hrp: String,
    #[serde(default = "default_min_pow_score")]
    pub min_pow_score: u32,
    #[serde(default)]
    pub rent_structure: RentStructure,
    #[serde(default = "default_token_supply")]
    pub token_supply: u64,
}

impl Default for NetworkInfoConfig {
    fn default() -> Self {
        Self {
            network_name: default_network_name(),
            bech32_hrp: default_bech32_hrp(),
            min_pow_score: default_min_pow_score(),
            rent_structure: RentStructure::default(),
            token_supply: default_token_supply(),
        }
    }
}

/// Loads the configuration from `path`, or defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let config_str = match fs::read_to_string(path.as_ref()) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let config: ClientConfig = if config_str.trim().is_empty() {
        ClientConfig::default()
    } else {
        toml::from_str(&config_str).map_err(|e| Error::Config(e.to_string()))?
    };
    config.validate()?;
    Ok(config)
}

mod duration_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(D::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

fn default_node_sync_interval() -> Duration {
    DEFAULT_NODE_SYNC_INTERVAL
}

fn default_api_timeout() -> Duration {
    DEFAULT_API_TIMEOUT
}

fn default_remote_pow_timeout() -> Duration {
    DEFAULT_REMOTE_POW_TIMEOUT
}

fn default_tips_interval() -> Duration {
    DEFAULT_TIPS_INTERVAL
}

fn default_min_quorum_size() -> usize {
    DEFAULT_MIN_QUORUM_SIZE
}

fn default_quorum_threshold() -> usize {
    DEFAULT_QUORUM_THRESHOLD
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_block_cache_size() -> usize {
    DEFAULT_BLOCK_CACHE_SIZE
}

fn default_input_reservation_ttl() -> Duration {
    DEFAULT_INPUT_RESERVATION_TTL
}

fn default_network_name() -> String {
    "trinity-devnet".to_string()
}

fn default_bech32_hrp() -> String {
    "tri".to_string()
}

fn default_min_pow_score() -> u32 {
    12
}

fn default_token_supply() -> u64 {
    420_000_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_with_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            nodes = ["http://localhost:14265", { url = "http://other:14265", disabled = true }]
            api_timeout = "2s"

            [quorum]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert!(config.nodes[1].disabled);
        assert_eq!(config.api_timeout, Duration::from_secs(2));
        assert_eq!(config.node_sync_interval, DEFAULT_NODE_SYNC_INTERVAL);
        assert!(config.quorum.enabled);
        assert_eq!(config.quorum.min_quorum_size, 3);
        assert_eq!(config.quorum.threshold, 66);
        assert!(config.pow.local_pow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_err(), "no nodes and not offline");

        config.offline = true;
        assert!(config.validate().is_ok());

        config.quorum.threshold = 0;
        assert!(config.validate().is_err());
        config.quorum.threshold = 66;

        config.nodes.push(NodeConfig::new("not a url"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Config(_))));

        let path = dir.path().join("client.toml");
        std::fs::write(&path, "offline = true\n").unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.offline);
        assert_eq!(config.network_info.bech32_hrp, "tri");
    }

    #[test]
    fn test_auth_is_redacted_in_debug() {
        let node = NodeConfig::new("http://localhost").with_auth(NodeAuth {
            jwt: Some("secret-token".to_string()),
            basic_auth_name_pwd: Some(("user".to_string(), "hunter2".to_string())),
        });
        let debug = format!("{:?}", node);
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("hunter2"));
    }
}
