//! Declarative flow rule descriptions and the installer seam.
//!
//! The synchronizer never touches a switch directly.  It builds
//! [`GatewayRule`]s and hands them to a [`FlowRuleService`], which owns
//! diffing against the dataplane and is expected to treat `install` as an
//! idempotent upsert keyed by device, selector, treatment, priority and
//! table.

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DeviceId, MacAddress, PortNumber};

pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// Prefix length of the gateway host match.
pub const GW_IP_PREFIX: u8 = 32;

pub const PRIORITY_GATEWAY_RULE: u32 = 31000;

/// Table reserved for routing rules.
pub const ROUTING_TABLE: u32 = 30;

/// Application identity under which rules are installed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4Prefix {
    pub address: Ipv4Addr,
    pub len: u8,
}

impl Ipv4Prefix {
    pub fn host(address: Ipv4Addr) -> Self {
        Self {
            address,
            len: GW_IP_PREFIX,
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficSelector {
    pub eth_type: u16,
    pub ipv4_dst: Ipv4Prefix,
}

impl fmt::Display for TrafficSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eth_type=0x{:04x},ipv4_dst={}", self.eth_type, self.ipv4_dst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    SetEthDst(MacAddress),
    /// Nicira-style tunnel destination extension, scoped to `device`.
    TunnelDst { device: DeviceId, remote: Ipv4Addr },
    Output(PortNumber),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::SetEthDst(mac) => write!(f, "eth_dst={mac}"),
            Instruction::TunnelDst { remote, .. } => write!(f, "tun_dst={remote}"),
            Instruction::Output(port) => write!(f, "output:{port}"),
        }
    }
}

/// Ordered list of actions applied to matching traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficTreatment {
    pub instructions: Vec<Instruction>,
}

impl TrafficTreatment {
    pub fn builder() -> TreatmentBuilder {
        TreatmentBuilder::default()
    }

    pub fn output(&self) -> Option<PortNumber> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::Output(port) => Some(*port),
            _ => None,
        })
    }
}

impl fmt::Display for TrafficTreatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.instructions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{instruction}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TreatmentBuilder {
    instructions: Vec<Instruction>,
}

impl TreatmentBuilder {
    pub fn set_eth_dst(mut self, mac: MacAddress) -> Self {
        self.instructions.push(Instruction::SetEthDst(mac));
        self
    }

    pub fn tunnel_dst(mut self, device: DeviceId, remote: Ipv4Addr) -> Self {
        self.instructions.push(Instruction::TunnelDst { device, remote });
        self
    }

    pub fn set_output(mut self, port: PortNumber) -> Self {
        self.instructions.push(Instruction::Output(port));
        self
    }

    pub fn build(self) -> TrafficTreatment {
        TrafficTreatment {
            instructions: self.instructions,
        }
    }
}

/// One gateway reachability rule for one device.  Priority and table are
/// applied by the caller when the rule is handed to the installer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayRule {
    pub device: DeviceId,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
}

/// A fully specified install or uninstall request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRuleRequest {
    pub app_id: ApplicationId,
    pub device: DeviceId,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
    pub priority: u32,
    pub table: u32,
    pub install: bool,
}

/// The flow rule installer collaborator.
#[async_trait]
pub trait FlowRuleService: Send + Sync {
    /// Installs (`install == true`) or removes the described rule.
    async fn set_rule(&self, request: FlowRuleRequest) -> Result<()>;
}

/// Installer used by the standalone daemon: it records nothing and simply
/// reports every request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFlowRuleService;

#[async_trait]
impl FlowRuleService for LoggingFlowRuleService {
    async fn set_rule(&self, request: FlowRuleRequest) -> Result<()> {
        info!(
            "{} rule app={} device={} table={} priority={} match=[{}] actions=[{}]",
            if request.install { "Install" } else { "Remove" },
            request.app_id,
            request.device,
            request.table,
            request.priority,
            request.selector,
            request.treatment,
        );
        Ok(())
    }
}
