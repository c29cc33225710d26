//! Inventory feed for the standalone daemon.
//!
//! The feed reads newline-delimited JSON [`InventoryUpdate`] records (stdin
//! in the binary) and applies them to a [`MemoryInventory`], which in turn
//! raises the lifecycle events the synchronizer listens to.  A seed file
//! holding an [`InventorySnapshot`] can be loaded at startup.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::MemoryInventory;
use crate::types::{Network, Node};

/// A single change to the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InventoryUpdate {
    UpsertNetwork { network: Network },
    RemoveNetwork { network_id: String },
    UpsertNode { node: Node },
    RemoveNode { hostname: String },
}

impl InventoryUpdate {
    pub fn apply(self, inventory: &MemoryInventory) {
        match self {
            InventoryUpdate::UpsertNetwork { network } => inventory.upsert_network(network),
            InventoryUpdate::RemoveNetwork { network_id } => {
                if inventory.remove_network(&network_id).is_none() {
                    warn!("Ignoring removal of unknown network {}", network_id);
                }
            }
            InventoryUpdate::UpsertNode { node } => inventory.upsert_node(node),
            InventoryUpdate::RemoveNode { hostname } => {
                if inventory.remove_node(&hostname).is_none() {
                    warn!("Ignoring removal of unknown node {}", hostname);
                }
            }
        }
    }
}

/// Initial inventory contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl InventorySnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read inventory file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse inventory file {}", path.display()))
    }

    /// Nodes go in first so network events find their owners.
    pub fn apply(self, inventory: &MemoryInventory) {
        for node in self.nodes {
            inventory.upsert_node(node);
        }
        for network in self.networks {
            inventory.upsert_network(network);
        }
    }
}

/// Applies updates read line by line from `reader` until EOF.  Blank lines
/// are skipped; malformed lines are logged and skipped.  Returns the number
/// of updates applied.
pub async fn apply_feed<R>(reader: R, inventory: &MemoryInventory) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut applied = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InventoryUpdate>(line) {
            Ok(update) => {
                debug!("Applying inventory update: {:?}", update);
                update.apply(inventory);
                applied += 1;
            }
            Err(e) => {
                warn!("Skipping malformed inventory update: {}", e);
            }
        }
    }
    info!("Inventory feed closed after {} updates", applied);
    Ok(applied)
}
