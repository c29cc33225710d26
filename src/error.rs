//! Error types for gateway rule synthesis and installation.

use thiserror::Error;

use crate::types::NetworkType;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No node's hostname matches the network name, so there is no tunnel
    /// endpoint for remote nodes.
    #[error("network {network} has no owning node; cannot build gateway rule for {node}")]
    MissingOwner { network: String, node: String },

    #[error("node {node} has no {network_type} tunnel port for network {network_id}")]
    TunnelPortUnavailable {
        network_id: String,
        network_type: NetworkType,
        node: String,
    },

    #[error("flow rule installer rejected rule on {device}: {reason}")]
    Installer { device: String, reason: String },

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
