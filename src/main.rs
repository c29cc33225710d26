//! gwsync daemon entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::io::BufReader;
use tokio::signal;

use gwsync::flow::LoggingFlowRuleService;
use gwsync::inventory::{apply_feed, InventorySnapshot, MemoryInventory};
use gwsync::leadership::LocalLeadership;
use gwsync::tunnel::NetworkTypeResolver;
use gwsync::{Collaborators, Config, GatewayHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting gwsync with config: {:?}", cfg);
    let local_node = cfg.local_node();

    // Standalone collaborators
    let inventory = Arc::new(MemoryInventory::new());
    let collaborators = Collaborators {
        leadership: Arc::new(LocalLeadership::new(local_node.clone())),
        local_node,
        networks: inventory.clone(),
        nodes: inventory.clone(),
        tunnel_ports: Arc::new(NetworkTypeResolver::new(inventory.clone())),
        flow_rules: Arc::new(LoggingFlowRuleService),
    };
    let handler = GatewayHandler::activate(collaborators, cfg.rule_settings());

    // Seed inventory; events flow through the running handler
    if let Some(path) = &cfg.inventory_file {
        let snapshot = InventorySnapshot::load(path)?;
        info!(
            "Loaded {} networks and {} nodes from {}",
            snapshot.networks.len(),
            snapshot.nodes.len(),
            path.display()
        );
        snapshot.apply(&inventory);
    }

    // Inventory feed
    let feed_handle = cfg.read_stdin_feed.then(|| {
        let inventory = Arc::clone(&inventory);
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = apply_feed(stdin, &inventory).await {
                error!("Inventory feed failed: {}", e);
            }
        })
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    if let Some(handle) = feed_handle {
        handle.abort();
    }
    handler.deactivate().await;

    info!("Shutdown complete.");
    Ok(())
}
