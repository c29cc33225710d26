//! Inventory data structures observed by the synchronizer.
//!
//! Networks and nodes are owned by external inventory services; the
//! synchronizer only ever receives snapshots of them.  All types are
//! serialised with [`serde`](https://serde.rs/) so the standalone daemon can
//! seed and feed its in-memory inventory from JSON.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Identifier of a switch device (an integration bridge), e.g. `of:0000000000000001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 48-bit Ethernet address, serialised as `aa:bb:cc:dd:ee:ff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| SyncError::InvalidMac(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| SyncError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(SyncError::InvalidMac(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// A switch port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNumber(u32);

impl PortNumber {
    /// The switch's own local port (OpenFlow `OFPP_LOCAL`): traffic sent
    /// here is delivered into the bridge's host stack.
    pub const LOCAL: PortNumber = PortNumber(0xffff_fffe);

    pub const fn new(port: u32) -> Self {
        Self(port)
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::LOCAL {
            f.write_str("LOCAL")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Overlay encapsulation used by a network.  Selects which tunnel port on
/// each node carries that network's traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkType {
    #[default]
    Vxlan,
    Gre,
    Geneve,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::Vxlan => f.write_str("VXLAN"),
            NetworkType::Gre => f.write_str("GRE"),
            NetworkType::Geneve => f.write_str("GENEVE"),
        }
    }
}

/// A logical network.
///
/// `name` doubles as the ownership key: the node whose hostname equals the
/// network name hosts the network's gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub network_id: String,
    #[serde(default)]
    pub network_type: NetworkType,
    /// Single host address of the gateway (no prefix).
    pub gateway_ip: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

/// Readiness of a node.  Only `Complete` nodes receive gateway rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    #[default]
    Incomplete,
    Complete,
}

/// Tunnel ports on a node's integration bridge, one per encapsulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelPorts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan: Option<PortNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gre: Option<PortNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geneve: Option<PortNumber>,
}

impl TunnelPorts {
    pub fn port_for(&self, network_type: NetworkType) -> Option<PortNumber> {
        match network_type {
            NetworkType::Vxlan => self.vxlan,
            NetworkType::Gre => self.gre,
            NetworkType::Geneve => self.geneve,
        }
    }
}

/// A worker node and its integration bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub int_bridge: DeviceId,
    pub int_bridge_mac: MacAddress,
    pub data_ip: Ipv4Addr,
    #[serde(default)]
    pub state: NodeState,
    #[serde(default)]
    pub tunnel_ports: TunnelPorts,
}

impl Node {
    pub fn is_complete(&self) -> bool {
        self.state == NodeState::Complete
    }

    /// Whether this node hosts the gateway of `network`.
    pub fn owns(&self, network: &Network) -> bool {
        self.hostname == network.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEventType {
    Created,
    Updated,
    Removed,
}

/// A network lifecycle notification carrying the network snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub kind: NetworkEventType,
    pub subject: Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventType {
    Complete,
    Incomplete,
}

/// A node state transition carrying the node snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub kind: NodeEventType,
    pub subject: Node,
}
