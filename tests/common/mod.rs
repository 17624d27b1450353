//! Shared fixtures: a scripted in-memory node network

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trinity_client::block::output::RentStructure;
use trinity_client::node_api::responses::{MilestoneRef, NodeInfo, NodeStatus, ProtocolParameters};
use trinity_client::node_api::routes;
use trinity_client::node_manager::transport::{NodeResponse, NodeTransport};
use trinity_client::node_manager::Node;
use trinity_client::{Error, Result};

pub const NETWORK_NAME: &str = "trinity-testnet";
pub const HRP: &str = "tri";

pub fn node_info() -> NodeInfo {
    NodeInfo {
        name: "trinity-node".into(),
        version: "2.0.0".into(),
        status: NodeStatus {
            is_healthy: true,
            latest_milestone: MilestoneRef {
                index: 42,
                timestamp: Some(1_700_000_000),
            },
            confirmed_milestone: None,
        },
        protocol: ProtocolParameters {
            version: 2,
            network_name: NETWORK_NAME.into(),
            bech32_hrp: HRP.into(),
            min_pow_score: 0,
            rent_structure: RentStructure::default(),
            token_supply: 1_000_000_000_000,
        },
        features: Vec::new(),
    }
}

/// Answers per host and path. A reply scripted for `path?query` takes
/// precedence over one for the bare path. Unscripted requests fail like an
/// unreachable node; every call is counted.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(String, String), (u16, Value)>>,
    gets: AtomicUsize,
    posts: AtomicUsize,
    requested: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the info route of every host so they all sync as healthy.
    pub fn with_healthy_nodes(hosts: &[&str]) -> Arc<Self> {
        let transport = Self::new();
        for host in hosts {
            transport.reply(host, routes::INFO, &node_info());
        }
        transport
    }

    pub fn reply(&self, host: &str, path: &str, body: &impl Serialize) {
        self.reply_with_status(host, path, 200, body);
    }

    pub fn reply_with_status(&self, host: &str, path: &str, status: u16, body: &impl Serialize) {
        let body = serde_json::to_value(body).expect("fixture serializes");
        self.routes
            .lock()
            .insert((host.to_string(), path.to_string()), (status, body));
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.posts.load(Ordering::SeqCst)
    }

    /// Hosts that were asked for `path`, in order.
    pub fn hosts_asked(&self, path: &str) -> Vec<String> {
        self.requested
            .lock()
            .iter()
            .filter(|(_, p)| p == path)
            .map(|(host, _)| host.clone())
            .collect()
    }

    fn answer(&self, node: &Node, path: &str, query: Option<&str>) -> Result<NodeResponse> {
        let host = node.url.host_str().unwrap_or_default().to_string();
        self.requested.lock().push((host.clone(), path.to_string()));
        let routes = self.routes.lock();
        let scripted = query
            .and_then(|q| routes.get(&(host.clone(), format!("{}?{}", path, q))))
            .or_else(|| routes.get(&(host.clone(), path.to_string())));
        match scripted {
            Some((status, body)) => Ok(NodeResponse {
                status: *status,
                body: body.to_string(),
                url: format!("{}{}", node.url, path),
            }),
            None => Err(Error::Node(format!("{} unreachable", host))),
        }
    }
}

#[async_trait]
impl NodeTransport for ScriptedTransport {
    async fn get(&self, node: &Node, path: &str, query: Option<&str>) -> Result<NodeResponse> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.answer(node, path, query)
    }

    async fn post_json(&self, node: &Node, path: &str, _body: &Value) -> Result<NodeResponse> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        self.answer(node, path, None)
    }
}

pub fn url(host: &str) -> String {
    format!("http://{}:14265", host)
}
