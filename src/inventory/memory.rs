//! In-memory inventory used by the standalone daemon and by tests.
//!
//! Mutations fan lifecycle events out to registered listeners after the
//! store locks are released, so listeners are free to read the inventory
//! back.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use super::{ListenerId, NetworkInventory, NetworkListener, NodeInventory, NodeListener};
use crate::types::{Network, NetworkEvent, NetworkEventType, Node, NodeEvent, NodeEventType, NodeState};

#[derive(Default)]
pub struct MemoryInventory {
    /// Keyed by network id.
    networks: RwLock<BTreeMap<String, Network>>,
    /// Keyed by hostname.
    nodes: RwLock<BTreeMap<String, Node>>,
    network_listeners: RwLock<Vec<(ListenerId, Arc<dyn NetworkListener>)>>,
    node_listeners: RwLock<Vec<(ListenerId, Arc<dyn NodeListener>)>>,
    next_listener: AtomicU64,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a network.  Emits `Created` for a new id and
    /// `Updated` when an existing network changes.
    pub fn upsert_network(&self, network: Network) {
        let previous = self
            .networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(network.network_id.clone(), network.clone());

        let kind = match previous {
            None => NetworkEventType::Created,
            Some(prev) if prev != network => NetworkEventType::Updated,
            Some(_) => return,
        };
        self.notify_network(NetworkEvent {
            kind,
            subject: network,
        });
    }

    pub fn remove_network(&self, network_id: &str) -> Option<Network> {
        let removed = self
            .networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(network_id)?;
        self.notify_network(NetworkEvent {
            kind: NetworkEventType::Removed,
            subject: removed.clone(),
        });
        Some(removed)
    }

    /// Adds or replaces a node.  Emits `Complete` or `Incomplete` only when
    /// the node's state actually transitions; a new complete node counts as
    /// a transition.
    pub fn upsert_node(&self, node: Node) {
        let previous = self
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.hostname.clone(), node.clone());

        let previous_state = previous.map(|n| n.state);
        let kind = match (previous_state, node.state) {
            (Some(NodeState::Complete), NodeState::Complete) => return,
            (_, NodeState::Complete) => NodeEventType::Complete,
            (Some(NodeState::Complete), NodeState::Incomplete) => NodeEventType::Incomplete,
            (_, NodeState::Incomplete) => return,
        };
        self.notify_node(NodeEvent {
            kind,
            subject: node,
        });
    }

    /// Removes a node without emitting an event.
    pub fn remove_node(&self, hostname: &str) -> Option<Node> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hostname)
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_network(&self, event: NetworkEvent) {
        debug!("Network event {:?} for {}", event.kind, event.subject.name);
        let listeners: Vec<_> = self
            .network_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.event(event.clone());
        }
    }

    fn notify_node(&self, event: NodeEvent) {
        debug!("Node event {:?} for {}", event.kind, event.subject.hostname);
        let listeners: Vec<_> = self
            .node_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.event(event.clone());
        }
    }
}

impl NetworkInventory for MemoryInventory {
    fn networks(&self) -> Vec<Network> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn network(&self, network_id: &str) -> Option<Network> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(network_id)
            .cloned()
    }

    fn add_network_listener(&self, listener: Arc<dyn NetworkListener>) -> ListenerId {
        let id = self.next_id();
        self.network_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn remove_network_listener(&self, id: ListenerId) {
        self.network_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id);
    }
}

impl NodeInventory for MemoryInventory {
    fn complete_nodes(&self) -> Vec<Node> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|n| n.is_complete())
            .cloned()
            .collect()
    }

    fn node(&self, hostname: &str) -> Option<Node> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
            .cloned()
    }

    fn add_node_listener(&self, listener: Arc<dyn NodeListener>) -> ListenerId {
        let id = self.next_id();
        self.node_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn remove_node_listener(&self, id: ListenerId) {
        self.node_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(lid, _)| *lid != id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::testing::{network, node};

    #[derive(Default)]
    struct Collector {
        networks: Mutex<Vec<NetworkEvent>>,
        nodes: Mutex<Vec<NodeEvent>>,
    }

    impl NetworkListener for Collector {
        fn event(&self, event: NetworkEvent) {
            self.networks.lock().unwrap().push(event);
        }
    }

    impl NodeListener for Collector {
        fn event(&self, event: NodeEvent) {
            self.nodes.lock().unwrap().push(event);
        }
    }

    fn network_kinds(c: &Collector) -> Vec<NetworkEventType> {
        c.networks.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn node_kinds(c: &Collector) -> Vec<NodeEventType> {
        c.nodes.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn network_lifecycle_emits_created_updated_removed() {
        let inventory = MemoryInventory::new();
        let collector = Arc::new(Collector::default());
        inventory.add_network_listener(collector.clone());

        let mut n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        inventory.upsert_network(n1.clone());
        inventory.upsert_network(n1.clone());
        n1.gateway_ip = [10, 0, 1, 254].into();
        inventory.upsert_network(n1);
        assert!(inventory.remove_network("net-1").is_some());
        assert!(inventory.remove_network("net-1").is_none());

        assert_eq!(
            network_kinds(&collector),
            vec![
                NetworkEventType::Created,
                NetworkEventType::Updated,
                NetworkEventType::Removed
            ]
        );
    }

    #[test]
    fn node_events_fire_only_on_state_transitions() {
        let inventory = MemoryInventory::new();
        let collector = Arc::new(Collector::default());
        inventory.add_node_listener(collector.clone());

        let mut w1 = node("worker-1", 1, NodeState::Incomplete);
        inventory.upsert_node(w1.clone());
        w1.state = NodeState::Complete;
        inventory.upsert_node(w1.clone());
        inventory.upsert_node(w1.clone());
        w1.state = NodeState::Incomplete;
        inventory.upsert_node(w1);

        assert_eq!(
            node_kinds(&collector),
            vec![NodeEventType::Complete, NodeEventType::Incomplete]
        );
    }

    #[test]
    fn complete_nodes_filters_incomplete() {
        let inventory = MemoryInventory::new();
        inventory.upsert_node(node("worker-1", 1, NodeState::Complete));
        inventory.upsert_node(node("worker-2", 2, NodeState::Incomplete));

        let complete: Vec<_> = inventory
            .complete_nodes()
            .into_iter()
            .map(|n| n.hostname)
            .collect();
        assert_eq!(complete, vec!["worker-1"]);
        assert!(inventory.node("worker-2").is_some());
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let inventory = MemoryInventory::new();
        let collector = Arc::new(Collector::default());
        let id = inventory.add_network_listener(collector.clone());

        inventory.upsert_network(network("worker-1", "net-1", [10, 0, 1, 1]));
        inventory.remove_network_listener(id);
        inventory.upsert_network(network("worker-2", "net-2", [10, 0, 2, 1]));

        assert_eq!(network_kinds(&collector), vec![NetworkEventType::Created]);
    }
}
