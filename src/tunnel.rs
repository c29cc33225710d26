//! Tunnel port resolution.

use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::inventory::NetworkInventory;
use crate::types::{Network, Node, PortNumber};

/// Finds the port on `node` that carries overlay traffic for a network.
/// Must be deterministic for a given inventory snapshot.
///
/// The network is passed as a snapshot rather than a bare id because a
/// removal is processed after the network has left the inventory.
pub trait TunnelPortResolver: Send + Sync {
    fn resolve_tunnel_port(&self, network: &Network, node: &Node) -> Result<PortNumber>;
}

/// Resolves by the network's encapsulation type: a VXLAN network uses the
/// node's VXLAN port, and so on.  The type is read from the inventory entry
/// for the network id, or from the snapshot once the network is gone.
pub struct NetworkTypeResolver {
    networks: Arc<dyn NetworkInventory>,
}

impl NetworkTypeResolver {
    pub fn new(networks: Arc<dyn NetworkInventory>) -> Self {
        Self { networks }
    }
}

impl TunnelPortResolver for NetworkTypeResolver {
    fn resolve_tunnel_port(&self, network: &Network, node: &Node) -> Result<PortNumber> {
        let network_type = self
            .networks
            .network(&network.network_id)
            .map_or(network.network_type, |n| n.network_type);

        node.tunnel_ports
            .port_for(network_type)
            .ok_or_else(|| SyncError::TunnelPortUnavailable {
                network_id: network.network_id.clone(),
                network_type,
                node: node.hostname.clone(),
            })
    }
}
