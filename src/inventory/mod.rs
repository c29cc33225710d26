use std::sync::Arc;

use crate::types::{Network, NetworkEvent, Node, NodeEvent};

pub mod feed;
pub mod memory;
pub use feed::{apply_feed, InventorySnapshot, InventoryUpdate};
pub use memory::MemoryInventory;

/// Handle returned when a listener is registered, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Receives network lifecycle events.  Implementations must not block.
pub trait NetworkListener: Send + Sync {
    fn event(&self, event: NetworkEvent);
}

/// Receives node state transitions.  Implementations must not block.
pub trait NodeListener: Send + Sync {
    fn event(&self, event: NodeEvent);
}

/// Read-only view of the logical networks.
pub trait NetworkInventory: Send + Sync {
    fn networks(&self) -> Vec<Network>;

    fn network(&self, network_id: &str) -> Option<Network>;

    fn add_network_listener(&self, listener: Arc<dyn NetworkListener>) -> ListenerId;

    fn remove_network_listener(&self, id: ListenerId);
}

/// Read-only view of the worker nodes.
pub trait NodeInventory: Send + Sync {
    fn complete_nodes(&self) -> Vec<Node>;

    /// Looks a node up by hostname regardless of its state.
    fn node(&self, hostname: &str) -> Option<Node>;

    fn add_node_listener(&self, listener: Arc<dyn NodeListener>) -> ListenerId;

    fn remove_node_listener(&self, id: ListenerId);
}
