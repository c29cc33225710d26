//! Fixtures and collaborator doubles shared by the unit tests.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::flow::{FlowRuleRequest, FlowRuleService};
use crate::leadership::{LeadershipService, NodeId};
use crate::tunnel::TunnelPortResolver;
use crate::types::{
    DeviceId, MacAddress, Network, NetworkType, Node, NodeState, PortNumber, TunnelPorts,
};

pub fn network(name: &str, network_id: &str, gateway: [u8; 4]) -> Network {
    Network {
        name: name.to_string(),
        network_id: network_id.to_string(),
        network_type: NetworkType::Vxlan,
        gateway_ip: Ipv4Addr::from(gateway),
        cidr: None,
    }
}

/// Node number `index` gets bridge `of:000000000000000<index>`, data IP
/// `192.168.0.<10 + index>` and VXLAN/GRE ports `<index>01`/`<index>02`.
pub fn node(hostname: &str, index: u8, state: NodeState) -> Node {
    Node {
        hostname: hostname.to_string(),
        int_bridge: DeviceId::new(format!("of:{:016x}", index)),
        int_bridge_mac: MacAddress::new([0x02, 0, 0, 0, 0, index]),
        data_ip: Ipv4Addr::new(192, 168, 0, 10 + index),
        state,
        tunnel_ports: TunnelPorts {
            vxlan: Some(PortNumber::new(u32::from(index) * 100 + 1)),
            gre: Some(PortNumber::new(u32::from(index) * 100 + 2)),
            geneve: None,
        },
    }
}

/// Resolves every network on every node to the same port.
pub struct FixedPorts(pub u32);

impl TunnelPortResolver for FixedPorts {
    fn resolve_tunnel_port(&self, _network: &Network, _node: &Node) -> Result<PortNumber> {
        Ok(PortNumber::new(self.0))
    }
}

/// Installer double that records accepted requests in call order.
#[derive(Default)]
pub struct RecordingFlowRules {
    requests: Mutex<Vec<FlowRuleRequest>>,
    failing: Mutex<HashSet<DeviceId>>,
    panic_next: AtomicBool,
}

impl RecordingFlowRules {
    pub fn requests(&self) -> Vec<FlowRuleRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Rejects every request for `device`.
    pub fn fail_on(&self, device: DeviceId) {
        self.failing.lock().unwrap().insert(device);
    }

    /// Panics inside the next `set_rule` call.
    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlowRuleService for RecordingFlowRules {
    async fn set_rule(&self, request: FlowRuleRequest) -> Result<()> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("installer exploded");
        }
        if self.failing.lock().unwrap().contains(&request.device) {
            return Err(SyncError::Installer {
                device: request.device.to_string(),
                reason: "device offline".to_string(),
            });
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// Leadership double whose leader can be moved at any time.
pub struct SwitchableLeadership {
    leader: Mutex<Option<NodeId>>,
    candidacy: Mutex<Vec<String>>,
}

impl SwitchableLeadership {
    pub fn led_by(id: &str) -> Self {
        Self {
            leader: Mutex::new(Some(NodeId::new(id))),
            candidacy: Mutex::new(Vec::new()),
        }
    }

    pub fn set_leader(&self, id: Option<&str>) {
        *self.leader.lock().unwrap() = id.map(NodeId::new);
    }

    pub fn candidacy_log(&self) -> Vec<String> {
        self.candidacy.lock().unwrap().clone()
    }
}

impl LeadershipService for SwitchableLeadership {
    fn run_for_leadership(&self, topic: &str) {
        self.candidacy.lock().unwrap().push(format!("run:{topic}"));
    }

    fn withdraw(&self, topic: &str) {
        self.candidacy.lock().unwrap().push(format!("withdraw:{topic}"));
    }

    fn leader(&self, _topic: &str) -> Option<NodeId> {
        self.leader.lock().unwrap().clone()
    }
}
