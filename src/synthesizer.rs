//! Gateway rule synthesis.
//!
//! For one network, every complete node gets exactly one rule matching IPv4
//! traffic to the gateway's host address:
//!
//! * on the **owning node** (hostname equals the network name) traffic is
//!   rewritten to the integration bridge MAC and delivered to the bridge's
//!   `LOCAL` port;
//! * on every **remote node** traffic is tunnelled to the owning node's
//!   data-plane IP through the tunnel port for the network's encapsulation.
//!
//! Synthesis is pure: the same inputs always yield the same rules, which is
//! what lets removal reuse it to produce exactly the rules that were
//! installed.

use crate::error::{Result, SyncError};
use crate::flow::{GatewayRule, Ipv4Prefix, TrafficSelector, TrafficTreatment, ETH_TYPE_IPV4};
use crate::tunnel::TunnelPortResolver;
use crate::types::{Network, Node, PortNumber};

pub fn gateway_selector(network: &Network) -> TrafficSelector {
    TrafficSelector {
        eth_type: ETH_TYPE_IPV4,
        ipv4_dst: Ipv4Prefix::host(network.gateway_ip),
    }
}

/// Builds one rule per node in `nodes`.  `owner` is the node hosting the
/// network's gateway, if the inventory knows one.  Failures are reported per
/// node and never prevent rules for the other nodes.
pub fn synthesize(
    network: &Network,
    nodes: &[Node],
    owner: Option<&Node>,
    resolver: &dyn TunnelPortResolver,
) -> Vec<Result<GatewayRule>> {
    nodes
        .iter()
        .map(|node| synthesize_for_node(network, node, owner, resolver))
        .collect()
}

/// Builds the rule for a single (network, node) pair.
pub fn synthesize_for_node(
    network: &Network,
    node: &Node,
    owner: Option<&Node>,
    resolver: &dyn TunnelPortResolver,
) -> Result<GatewayRule> {
    let treatment = treatment_for(network, node, owner, resolver)?;
    Ok(GatewayRule {
        device: node.int_bridge.clone(),
        selector: gateway_selector(network),
        treatment,
    })
}

fn treatment_for(
    network: &Network,
    node: &Node,
    owner: Option<&Node>,
    resolver: &dyn TunnelPortResolver,
) -> Result<TrafficTreatment> {
    if node.owns(network) {
        return Ok(TrafficTreatment::builder()
            .set_eth_dst(node.int_bridge_mac)
            .set_output(PortNumber::LOCAL)
            .build());
    }

    let port = resolver.resolve_tunnel_port(network, node)?;
    let owner = owner
        .filter(|o| o.owns(network))
        .ok_or_else(|| SyncError::MissingOwner {
            network: network.name.clone(),
            node: node.hostname.clone(),
        })?;

    Ok(TrafficTreatment::builder()
        .tunnel_dst(node.int_bridge.clone(), owner.data_ip)
        .set_output(port)
        .build())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::flow::Instruction;
    use crate::testing::{network, node, FixedPorts};
    use crate::types::NodeState;

    fn ok_rules(results: Vec<Result<GatewayRule>>) -> Vec<GatewayRule> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn owning_node_delivers_locally() {
        let n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        let w1 = node("worker-1", 1, NodeState::Complete);

        let rules = ok_rules(synthesize(&n1, &[w1.clone()], Some(&w1), &FixedPorts(7)));

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device, w1.int_bridge);
        assert_eq!(
            rules[0].treatment.instructions,
            vec![
                Instruction::SetEthDst(w1.int_bridge_mac),
                Instruction::Output(PortNumber::LOCAL)
            ]
        );
    }

    #[test]
    fn remote_node_tunnels_to_owner_data_ip() {
        let n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        let w1 = node("worker-1", 1, NodeState::Complete);
        let w2 = node("worker-2", 2, NodeState::Complete);

        let rules = ok_rules(synthesize(&n1, &[w2.clone()], Some(&w1), &FixedPorts(7)));

        assert_eq!(rules[0].device, w2.int_bridge);
        assert_eq!(
            rules[0].treatment.instructions,
            vec![
                Instruction::TunnelDst {
                    device: w2.int_bridge.clone(),
                    remote: w1.data_ip
                },
                Instruction::Output(PortNumber::new(7))
            ]
        );
    }

    #[test]
    fn selector_is_gateway_host_match() {
        let n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        let selector = gateway_selector(&n1);
        assert_eq!(selector.eth_type, 0x0800);
        assert_eq!(selector.ipv4_dst.address, Ipv4Addr::new(10, 0, 1, 1));
        assert_eq!(selector.ipv4_dst.len, 32);
    }

    #[test]
    fn missing_owner_fails_only_remote_rules() {
        let orphan = network("worker-9", "net-9", [10, 0, 9, 1]);
        let nodes = vec![
            node("worker-1", 1, NodeState::Complete),
            node("worker-2", 2, NodeState::Complete),
        ];

        let results = synthesize(&orphan, &nodes, None, &FixedPorts(7));
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(SyncError::MissingOwner { network: name, .. }) if name == "worker-9")));
    }

    #[test]
    fn failed_pair_does_not_abort_other_pairs() {
        let n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        let w1 = node("worker-1", 1, NodeState::Complete);
        let mut w2 = node("worker-2", 2, NodeState::Complete);
        w2.tunnel_ports.vxlan = None;
        let w3 = node("worker-3", 3, NodeState::Complete);
        let inventory = std::sync::Arc::new(crate::inventory::MemoryInventory::new());
        inventory.upsert_network(n1.clone());
        let resolver = crate::tunnel::NetworkTypeResolver::new(inventory);

        let results = synthesize(&n1, &[w1.clone(), w2, w3.clone()], Some(&w1), &resolver);

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SyncError::TunnelPortUnavailable { .. })));
        assert_eq!(
            results[2].as_ref().unwrap().treatment.output(),
            w3.tunnel_ports.vxlan
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let n1 = network("worker-1", "net-1", [10, 0, 1, 1]);
        let nodes = vec![
            node("worker-1", 1, NodeState::Complete),
            node("worker-2", 2, NodeState::Complete),
        ];

        let first = ok_rules(synthesize(&n1, &nodes, Some(&nodes[0]), &FixedPorts(7)));
        let second = ok_rules(synthesize(&n1, &nodes, Some(&nodes[0]), &FixedPorts(7)));
        assert_eq!(first, second);
    }
}
