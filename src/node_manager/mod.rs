//! Node pool and request dispatch
//!
//! The pool owns the configured nodes and a health table that only the
//! [`sync::NodeSynchronizer`] writes. Requests pick candidates from a
//! snapshot of that table:
//!
//! 1. the primary PoW node, for posts that rely on remote proof-of-work
//! 2. the primary node
//! 3. healthy nodes in random order (all nodes when health is ignored)
//!
//! Disabled nodes never appear. Reads go node by node until one succeeds,
//! or through the [`QuorumEvaluator`] when quorum is enabled for the route.
//! Posts are never quorum-evaluated.

pub mod sync;
pub mod transport;

use crate::config::{ClientConfig, NodeAuth, NodeConfig, QuorumConfig};
use crate::error::{Error, Result};
use crate::node_api::responses::NodeInfo;
use crate::quorum::QuorumEvaluator;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use transport::{NodeResponse, NodeTransport};

/// A node the client may talk to.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub url: Url,
    pub auth: Option<NodeAuth>,
    pub disabled: bool,
}

/// Credentials stay out of the serialized form.
impl Serialize for Node {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Node", 2)?;
        state.serialize_field("url", self.url.as_str())?;
        state.serialize_field("disabled", &self.disabled)?;
        state.end()
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("url", &self.url.as_str())
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

impl TryFrom<&NodeConfig> for Node {
    type Error = Error;

    fn try_from(config: &NodeConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid node url {}: {}", config.url, e)))?;
        Ok(Node {
            url,
            auth: config.auth.clone(),
            disabled: config.disabled,
        })
    }
}

impl Node {
    pub fn new(url: &str) -> Result<Self> {
        Node::try_from(&NodeConfig::new(url))
    }

    /// Absolute URL of `path` on this node, keeping any base path.
    pub fn endpoint(&self, path: &str, query: Option<&str>) -> Result<Url> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Node(format!("invalid path {}: {}", path, e)))?;
        url.set_query(query);
        Ok(url)
    }
}

/// Last observation of a healthy node.
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub info: NodeInfo,
    pub last_seen: Instant,
}

impl NodeHealth {
    pub fn new(info: NodeInfo) -> Self {
        Self {
            info,
            last_seen: Instant::now(),
        }
    }

    /// Not refreshed for `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.last_seen.elapsed() > max_age
    }
}

pub struct NodeManager {
    pub(crate) primary_node: Option<Node>,
    pub(crate) primary_pow_node: Option<Node>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) ignore_node_health: bool,
    pub(crate) offline: bool,
    pub(crate) quorum_enabled: bool,
    pub(crate) quorum: QuorumEvaluator,
    pub(crate) api_timeout: Duration,
    pub(crate) remote_pow_timeout: Duration,
    pub(crate) healthy_nodes: Arc<RwLock<HashMap<Node, NodeHealth>>>,
    pub(crate) transport: Arc<dyn NodeTransport>,
}

impl core::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeManager")
            .field("primary_node", &self.primary_node)
            .field("primary_pow_node", &self.primary_pow_node)
            .field("nodes", &self.nodes)
            .field("offline", &self.offline)
            .field("healthy", &self.healthy_nodes.read().len())
            .finish_non_exhaustive()
    }
}

impl NodeManager {
    pub fn new(config: &ClientConfig, transport: Arc<dyn NodeTransport>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for node in &config.nodes {
            let node = Node::try_from(node)?;
            if seen.insert(node.url.clone()) {
                nodes.push(node);
            }
        }
        Ok(Self {
            primary_node: config.primary_node.as_ref().map(Node::try_from).transpose()?,
            primary_pow_node: config.primary_pow_node.as_ref().map(Node::try_from).transpose()?,
            nodes,
            ignore_node_health: config.ignore_node_health,
            offline: config.offline,
            quorum_enabled: config.quorum.enabled,
            quorum: QuorumEvaluator::from(&config.quorum),
            api_timeout: config.api_timeout,
            remote_pow_timeout: config.remote_pow_timeout,
            healthy_nodes: Arc::new(RwLock::new(HashMap::new())),
            transport,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn quorum_config(&self) -> QuorumConfig {
        QuorumConfig {
            enabled: self.quorum_enabled,
            min_quorum_size: self.quorum.min_quorum_size,
            threshold: self.quorum.threshold,
        }
    }

    /// Every configured node, primary nodes first, without duplicates.
    pub fn configured_nodes(&self) -> Vec<Node> {
        let mut seen = HashSet::new();
        self.primary_pow_node
            .iter()
            .chain(self.primary_node.iter())
            .chain(self.nodes.iter())
            .filter(|n| seen.insert(n.url.clone()))
            .cloned()
            .collect()
    }

    /// Snapshot of the health table.
    pub fn healthy_snapshot(&self) -> HashMap<Node, NodeHealth> {
        self.healthy_nodes.read().clone()
    }

    pub(crate) fn replace_healthy(&self, healthy: HashMap<Node, NodeHealth>) {
        *self.healthy_nodes.write() = healthy;
    }

    /// The node requests go to first.
    pub fn get_node(&self) -> Result<Node> {
        if self.offline {
            return Err(Error::OfflineMode);
        }
        self.primary_node
            .clone()
            .or_else(|| self.get_nodes(false).ok().and_then(|n| n.into_iter().next()))
            .or_else(|| self.nodes.iter().find(|n| !n.disabled).cloned())
            .ok_or(Error::NoHealthyNode)
    }

    /// Configured nodes that the last sync did not find healthy.
    pub fn unhealthy_nodes(&self) -> Vec<Node> {
        let healthy = self.healthy_nodes.read();
        self.configured_nodes()
            .into_iter()
            .filter(|n| !healthy.contains_key(n))
            .collect()
    }

    /// Ordered request candidates. With `remote_pow` only nodes able to do
    /// proof-of-work for the client are returned.
    pub fn get_nodes(&self, remote_pow: bool) -> Result<Vec<Node>> {
        if self.offline {
            return Err(Error::OfflineMode);
        }
        let healthy = self.healthy_nodes.read();
        let mut candidates = Vec::new();

        if remote_pow {
            candidates.extend(self.primary_pow_node.iter().cloned());
        }
        if let Some(primary) = &self.primary_node {
            let pow_ok = healthy.get(primary).map_or(false, |h| h.info.supports_remote_pow());
            if !remote_pow || pow_ok {
                candidates.push(primary.clone());
            }
        }

        let mut pool: Vec<Node> = if self.ignore_node_health {
            self.nodes.clone()
        } else {
            healthy.keys().cloned().collect()
        };
        if remote_pow {
            pool.retain(|n| healthy.get(n).map_or(false, |h| h.info.supports_remote_pow()));
        }
        pool.shuffle(&mut rand::thread_rng());
        candidates.extend(pool);
        drop(healthy);

        let mut seen = HashSet::new();
        candidates.retain(|n| !n.disabled && seen.insert(n.url.clone()));
        if candidates.is_empty() {
            return Err(Error::NoHealthyNode);
        }
        Ok(candidates)
    }

    /// GET `path`. With `need_quorum` and quorum enabled the answer must be
    /// agreed by the configured share of respondents.
    pub async fn get_request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        need_quorum: bool,
    ) -> Result<T> {
        Ok(self.get_request_with_url(path, query, need_quorum).await?.0)
    }

    /// Like [`Self::get_request`], also returning the URL of a node that
    /// gave the accepted answer.
    pub async fn get_request_with_url<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        need_quorum: bool,
    ) -> Result<(T, String)> {
        let candidates = self.get_nodes(false)?;
        if need_quorum && self.quorum_enabled {
            let outcome = self
                .quorum
                .query(
                    Arc::clone(&self.transport),
                    &candidates,
                    path,
                    query,
                    self.api_timeout,
                )
                .await?;
            let url = outcome.agreeing.first().cloned().unwrap_or_default();
            return Ok((serde_json::from_value(outcome.value)?, url));
        }
        let (url, response) = self.first_success(&candidates, |node| self.get_from(node, path, query)).await?;
        Ok((response.json()?, url))
    }

    /// GET `path` from one node, bypassing the pool.
    pub async fn get_from(&self, node: &Node, path: &str, query: Option<&str>) -> Result<NodeResponse> {
        if self.offline {
            return Err(Error::OfflineMode);
        }
        let reply = tokio::time::timeout(self.api_timeout, self.transport.get(node, path, query)).await;
        match reply {
            Ok(reply) => reply?.into_result(),
            Err(_) => Err(Error::Timeout {
                url: node.url.to_string(),
            }),
        }
    }

    /// POST a JSON body. Never quorum-evaluated.
    pub async fn post_request<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        remote_pow: bool,
    ) -> Result<T> {
        let candidates = self.get_nodes(remote_pow)?;
        let timeout = if remote_pow {
            self.remote_pow_timeout
        } else {
            self.api_timeout
        };
        let (_, response) = self
            .first_success(&candidates, |node| async move {
                let reply = tokio::time::timeout(timeout, self.transport.post_json(node, path, body)).await;
                match reply {
                    Ok(reply) => reply?.into_result(),
                    Err(_) => Err(Error::Timeout {
                        url: node.url.to_string(),
                    }),
                }
            })
            .await?;
        response.json()
    }

    /// Tries candidates in order; the last error is returned when all fail.
    async fn first_success<'a, F, Fut>(
        &'a self,
        candidates: &'a [Node],
        mut attempt: F,
    ) -> Result<(String, NodeResponse)>
    where
        F: FnMut(&'a Node) -> Fut,
        Fut: std::future::Future<Output = Result<NodeResponse>> + 'a,
    {
        let mut last_error = Error::NoHealthyNode;
        for node in candidates {
            match attempt(node).await {
                Ok(response) => return Ok((node.url.to_string(), response)),
                Err(e) => {
                    match &e {
                        Error::NotFound(_) => debug!(url = %node.url, "not found on node"),
                        _ => warn!(url = %node.url, error = %e, "request failed, trying next node"),
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
