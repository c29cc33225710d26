//! Gateway reachability synchronizer.
//!
//! Keeps a gateway rule on every complete node's integration bridge for
//! every logical network: traffic to a network's gateway address is
//! delivered locally on the node that owns the network and tunnelled to
//! that owner from every other node.  Only the cluster leader programs
//! rules, and all work runs on one ordered worker.

pub mod config;
pub mod error;
pub mod flow;
pub mod handler;
pub mod inventory;
pub mod leadership;
pub mod synthesizer;
pub mod tunnel;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::SyncError;
pub use handler::{Collaborators, GatewayHandler, RuleSettings};
