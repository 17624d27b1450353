//! The client: independent services composed behind one cheap handle
//!
//! A [`Client`] is an `Arc` around the node pool, the shared network info,
//! the block cache, the input reservations and the event broker. Clones
//! share all of them. The background node sync stops when the last clone is
//! dropped.

mod builder;
mod network_info;

pub use builder::ClientBuilder;
pub use network_info::{network_id_from_name, NetworkInfo};

use crate::api::input_selection::InputReservations;
use crate::cache::BlockCache;
use crate::error::Result;
use crate::events::EventBroker;
use crate::node_manager::{Node, NodeManager};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) node_manager: Arc<NodeManager>,
    pub(crate) network_info: Arc<RwLock<NetworkInfo>>,
    pub(crate) pow_worker_count: Option<usize>,
    pub(crate) block_cache: BlockCache,
    pub(crate) reservations: InputReservations,
    pub(crate) events: EventBroker,
    pub(crate) sync_handle: Option<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = self.sync_handle.take() {
            handle.abort();
        }
    }
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("node_manager", &self.inner.node_manager)
            .field("network_info", &*self.inner.network_info.read())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn node_manager(&self) -> &NodeManager {
        &self.inner.node_manager
    }

    pub fn events(&self) -> &EventBroker {
        &self.inner.events
    }

    pub fn reservations(&self) -> &InputReservations {
        &self.inner.reservations
    }

    pub fn is_offline(&self) -> bool {
        self.inner.node_manager.is_offline()
    }

    /// Snapshot of the current network info.
    pub fn get_network_info(&self) -> NetworkInfo {
        self.inner.network_info.read().clone()
    }

    pub fn get_network_id(&self) -> u64 {
        self.inner.network_info.read().network_id
    }

    pub fn get_bech32_hrp(&self) -> String {
        self.inner.network_info.read().bech32_hrp.clone()
    }

    pub fn get_min_pow_score(&self) -> u32 {
        self.inner.network_info.read().min_pow_score
    }

    pub fn get_tips_interval(&self) -> u64 {
        self.inner.network_info.read().tips_interval
    }

    pub fn get_local_pow(&self) -> bool {
        self.inner.network_info.read().local_pow
    }

    pub fn get_fallback_to_local_pow(&self) -> bool {
        self.inner.network_info.read().fallback_to_local_pow
    }

    pub fn get_node(&self) -> Result<Node> {
        self.inner.node_manager.get_node()
    }

    pub fn unhealthy_nodes(&self) -> Vec<Node> {
        self.inner.node_manager.unhealthy_nodes()
    }
}
