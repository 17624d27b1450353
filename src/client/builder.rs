use crate::api::input_selection::InputReservations;
use crate::cache::BlockCache;
use crate::client::{Client, ClientInner, NetworkInfo};
use crate::config::{ClientConfig, NodeAuth, NodeConfig};
use crate::error::{Error, Result};
use crate::events::EventBroker;
use crate::node_manager::sync::NodeSynchronizer;
use crate::node_manager::transport::{HttpTransport, NodeTransport};
use crate::node_manager::NodeManager;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds a [`Client`] from a [`ClientConfig`] plus per-field overrides.
///
/// Fields not overridden keep their configured (or default) value.
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn NodeTransport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
        }
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Options as sent by a binding, a JSON object shaped like [`ClientConfig`].
    pub fn from_json(options: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_json::from_str(options).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self::from_config(config))
    }

    pub fn with_node(mut self, url: &str) -> Self {
        self.config.nodes.push(NodeConfig::new(url));
        self
    }

    pub fn with_nodes(mut self, urls: &[&str]) -> Self {
        self.config.nodes.extend(urls.iter().map(|u| NodeConfig::new(*u)));
        self
    }

    pub fn with_node_auth(mut self, url: &str, auth: NodeAuth) -> Self {
        self.config.nodes.push(NodeConfig::new(url).with_auth(auth));
        self
    }

    pub fn with_primary_node(mut self, url: &str, auth: Option<NodeAuth>) -> Self {
        let mut node = NodeConfig::new(url);
        node.auth = auth;
        self.config.primary_node = Some(node);
        self
    }

    pub fn with_primary_pow_node(mut self, url: &str, auth: Option<NodeAuth>) -> Self {
        let mut node = NodeConfig::new(url);
        node.auth = auth;
        self.config.primary_pow_node = Some(node);
        self
    }

    pub fn with_ignore_node_health(mut self) -> Self {
        self.config.ignore_node_health = true;
        self
    }

    pub fn with_node_sync_disabled(mut self) -> Self {
        self.config.node_sync_enabled = false;
        self
    }

    pub fn with_node_sync_interval(mut self, interval: Duration) -> Self {
        self.config.node_sync_interval = interval;
        self
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn with_remote_pow_timeout(mut self, timeout: Duration) -> Self {
        self.config.remote_pow_timeout = timeout;
        self
    }

    pub fn with_quorum(mut self, enabled: bool) -> Self {
        self.config.quorum.enabled = enabled;
        self
    }

    pub fn with_min_quorum_size(mut self, size: usize) -> Self {
        self.config.quorum.min_quorum_size = size;
        self
    }

    pub fn with_quorum_threshold(mut self, threshold: usize) -> Self {
        self.config.quorum.threshold = threshold;
        self
    }

    pub fn with_local_pow(mut self, local: bool) -> Self {
        self.config.pow.local_pow = local;
        self
    }

    pub fn with_fallback_to_local_pow(mut self, fallback: bool) -> Self {
        self.config.pow.fallback_to_local_pow = fallback;
        self
    }

    pub fn with_pow_worker_count(mut self, workers: usize) -> Self {
        self.config.pow.worker_count = Some(workers);
        self
    }

    pub fn with_tips_interval(mut self, seconds: u64) -> Self {
        self.config.pow.tips_interval = Duration::from_secs(seconds);
        self
    }

    pub fn with_offline_mode(mut self) -> Self {
        self.config.offline = true;
        self
    }

    pub fn with_network_name(mut self, name: &str) -> Self {
        self.config.network_info.network_name = name.to_string();
        self
    }

    pub fn with_bech32_hrp(mut self, hrp: &str) -> Self {
        self.config.network_info.bech32_hrp = hrp.to_string();
        self
    }

    pub fn with_min_pow_score(mut self, score: u32) -> Self {
        self.config.network_info.min_pow_score = score;
        self
    }

    /// Replaces the HTTP transport, e.g. with an instrumented one.
    pub fn with_transport(mut self, transport: Arc<dyn NodeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validates the options, runs the first health round and starts the
    /// background sync. Unreachable nodes do not make this fail; requests
    /// fail with `NoHealthyNode` instead.
    pub async fn finish(self) -> Result<Client> {
        let config = self.config;
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config.user_agent)?),
        };
        let node_manager = Arc::new(NodeManager::new(&config, transport)?);
        let network_info = Arc::new(RwLock::new(NetworkInfo::from_config(&config)));

        let mut sync_handle = None;
        if !config.offline {
            let synchronizer = NodeSynchronizer::new(Arc::clone(&node_manager), Arc::clone(&network_info));
            synchronizer.sync_once().await;
            if config.node_sync_enabled {
                sync_handle = Some(synchronizer.spawn(config.node_sync_interval));
            }
        }
        info!(
            offline = config.offline,
            nodes = node_manager.configured_nodes().len(),
            healthy = node_manager.healthy_snapshot().len(),
            "client ready"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                events: EventBroker::new(Arc::clone(&node_manager)),
                node_manager,
                network_info,
                pow_worker_count: config.pow.worker_count,
                block_cache: BlockCache::new(config.block_cache_size),
                reservations: InputReservations::new(config.input_reservation_ttl),
                sync_handle,
            }),
        })
    }
}
