//! Node health synchronization
//!
//! The synchronizer is the only writer of the health table and of the shared
//! [`NetworkInfo`]. Each round it:
//! - queries the info route of every enabled node concurrently
//! - keeps the nodes reporting healthy (or every node that answered when
//!   health is ignored)
//! - groups them by network name and keeps the largest network
//! - swaps the new table in and refreshes the protocol parameters

use crate::client::NetworkInfo;
use crate::error::Result;
use crate::node_api::responses::NodeInfo;
use crate::node_api::routes;
use crate::node_manager::{Node, NodeHealth, NodeManager};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct NodeSynchronizer {
    manager: Arc<NodeManager>,
    network_info: Arc<RwLock<NetworkInfo>>,
}

impl NodeSynchronizer {
    pub fn new(manager: Arc<NodeManager>, network_info: Arc<RwLock<NetworkInfo>>) -> Self {
        Self {
            manager,
            network_info,
        }
    }

    /// Fetches the info of one node, bounded by the API timeout.
    pub async fn fetch_info(manager: &NodeManager, node: &Node) -> Result<NodeInfo> {
        manager.get_from(node, routes::INFO, None).await?.json()
    }

    /// One health round. Unreachable nodes are logged and left out; the
    /// round itself never fails.
    pub async fn sync_once(&self) {
        if self.manager.is_offline() {
            return;
        }

        let mut tasks = JoinSet::new();
        for node in self.manager.configured_nodes().into_iter().filter(|n| !n.disabled) {
            let manager = Arc::clone(&self.manager);
            tasks.spawn(async move {
                let result = Self::fetch_info(&manager, &node).await;
                (node, result)
            });
        }

        let mut networks: HashMap<String, Vec<(Node, NodeInfo)>> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node, Ok(info))) => {
                    if info.status.is_healthy || self.manager.ignore_node_health {
                        networks
                            .entry(info.protocol.network_name.clone())
                            .or_default()
                            .push((node, info));
                    } else {
                        debug!(url = %node.url, "node reports unhealthy");
                    }
                }
                Ok((node, Err(e))) => warn!(url = %node.url, error = %e, "couldn't get node info"),
                Err(e) => warn!(error = %e, "node info task failed"),
            }
        }

        let Some((network_name, members)) = networks.into_iter().max_by_key(|(_, m)| m.len()) else {
            warn!("no healthy node found");
            self.manager.replace_healthy(HashMap::new());
            return;
        };

        let latest_timestamp = members
            .iter()
            .filter_map(|(_, info)| info.status.latest_milestone.timestamp)
            .max();
        if let Some((_, info)) = members.first() {
            self.network_info
                .write()
                .update_from_protocol(&info.protocol, latest_timestamp);
        }

        let healthy: HashMap<Node, NodeHealth> = members
            .into_iter()
            .map(|(node, info)| (node, NodeHealth::new(info)))
            .collect();
        info!(network = %network_name, healthy = healthy.len(), "node pool synchronized");
        self.manager.replace_healthy(healthy);
    }

    /// Runs [`Self::sync_once`] every `interval` until the handle is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.sync_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, NodeConfig};
    use crate::error::Error;
    use crate::node_manager::transport::{NodeResponse, NodeTransport};
    use async_trait::async_trait;
    use serde_json::json;

    /// Serves per-host info bodies; hosts without one are unreachable.
    struct InfoTransport(HashMap<String, serde_json::Value>);

    #[async_trait]
    impl NodeTransport for InfoTransport {
        async fn get(&self, node: &Node, _: &str, _: Option<&str>) -> Result<NodeResponse> {
            let host = node.url.host_str().unwrap_or_default().to_string();
            match self.0.get(&host) {
                Some(body) => Ok(NodeResponse {
                    status: 200,
                    body: body.to_string(),
                    url: node.url.to_string(),
                }),
                None => Err(Error::Node("unreachable".into())),
            }
        }

        async fn post_json(&self, _: &Node, _: &str, _: &serde_json::Value) -> Result<NodeResponse> {
            Err(Error::Node("unsupported".into()))
        }
    }

    fn info(network: &str, healthy: bool) -> serde_json::Value {
        json!({
            "name": "node",
            "version": "1.0.0",
            "status": {"isHealthy": healthy, "latestMilestone": {"index": 5, "timestamp": 1000}},
            "protocol": {
                "version": 2,
                "networkName": network,
                "bech32Hrp": "tst",
                "minPowScore": 4,
                "rentStructure": {"vByteCost": 100, "vByteFactorData": 1, "vByteFactorKey": 10},
                "tokenSupply": "1000"
            },
            "features": []
        })
    }

    fn synchronizer(hosts: &[(&str, Option<serde_json::Value>)]) -> NodeSynchronizer {
        let config = ClientConfig {
            nodes: hosts
                .iter()
                .map(|(h, _)| NodeConfig::new(format!("http://{}:14265", h)))
                .collect(),
            ..Default::default()
        };
        let bodies = hosts
            .iter()
            .filter_map(|(h, b)| b.clone().map(|b| (h.to_string(), b)))
            .collect();
        let manager = Arc::new(NodeManager::new(&config, Arc::new(InfoTransport(bodies))).unwrap());
        let network_info = Arc::new(RwLock::new(NetworkInfo::from_config(&config)));
        NodeSynchronizer::new(manager, network_info)
    }

    #[tokio::test]
    async fn test_largest_network_wins() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let sync = synchronizer(&[
                ("a", Some(info("main", true))),
                ("b", Some(info("main", true))),
                ("c", Some(info("fork", true))),
                ("d", None),
            ]);
            sync.sync_once().await;

            let healthy = sync.manager.healthy_snapshot();
            assert_eq!(healthy.len(), 2);
            assert!(healthy.values().all(|h| h.info.protocol.network_name == "main"));

            let network_info = sync.network_info.read().clone();
            assert_eq!(network_info.network_name, "main");
            assert_eq!(network_info.bech32_hrp, "tst");
            assert_eq!(network_info.min_pow_score, 4);
            assert_eq!(network_info.latest_milestone_timestamp, Some(1000));
        })
        .await
        .expect("test_largest_network_wins timed out");
    }

    #[tokio::test]
    async fn test_unhealthy_nodes_excluded() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let sync = synchronizer(&[("a", Some(info("main", false))), ("b", None)]);
            sync.sync_once().await;
            assert!(sync.manager.healthy_snapshot().is_empty());
            assert!(matches!(sync.manager.get_nodes(false), Err(Error::NoHealthyNode)));
            assert_eq!(sync.manager.unhealthy_nodes().len(), 2);
        })
        .await
        .expect("test_unhealthy_nodes_excluded timed out");
    }

    #[tokio::test]
    async fn test_background_task_refreshes() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let sync = synchronizer(&[("a", Some(info("main", true)))]);
            let manager = Arc::clone(&sync.manager);
            let handle = sync.spawn(Duration::from_millis(10));
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(manager.healthy_snapshot().len(), 1);
            handle.abort();
        })
        .await
        .expect("test_background_task_refreshes timed out");
    }
}
