//! Gateway switching handler.
//!
//! Turns network and node lifecycle events into gateway rule installs and
//! removals.  Listener callbacks never do work inline: they push a [`Task`]
//! onto an unbounded channel that a single worker task drains in FIFO
//! order, so events from both sources are applied strictly in the order
//! they were raised and only one writer ever programs gateway rules.
//!
//! Leadership is checked when a task is dequeued, not when it is
//! submitted.  A task queued while this member led is dropped if
//! leadership moved in the meantime.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::flow::{
    ApplicationId, FlowRuleRequest, FlowRuleService, PRIORITY_GATEWAY_RULE, ROUTING_TABLE,
};
use crate::inventory::{ListenerId, NetworkInventory, NetworkListener, NodeInventory, NodeListener};
use crate::leadership::{LeadershipGate, LeadershipService, NodeId};
use crate::synthesizer::synthesize_for_node;
use crate::tunnel::TunnelPortResolver;
use crate::types::{Network, NetworkEvent, NetworkEventType, Node, NodeEvent, NodeEventType};

/// External services the handler reads from and writes to.
pub struct Collaborators {
    pub leadership: Arc<dyn LeadershipService>,
    pub local_node: NodeId,
    pub networks: Arc<dyn NetworkInventory>,
    pub nodes: Arc<dyn NodeInventory>,
    pub tunnel_ports: Arc<dyn TunnelPortResolver>,
    pub flow_rules: Arc<dyn FlowRuleService>,
}

/// Identity and placement of the rules this handler installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSettings {
    pub app_id: ApplicationId,
    pub priority: u32,
    pub table: u32,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            app_id: ApplicationId::new(crate::config::DEFAULT_APP_NAME),
            priority: PRIORITY_GATEWAY_RULE,
            table: ROUTING_TABLE,
        }
    }
}

/// Outcome of one rule pass over a network.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuleReport {
    pub applied: usize,
    pub failed: usize,
}

#[derive(Debug)]
enum Task {
    Install(Network),
    Uninstall(Network),
    Backfill(Node),
}

/// Sending half of the work queue, shared by both listeners.  Closing it
/// stops intake; the worker then drains what is already queued.
struct EventQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
}

impl EventQueue {
    fn new(tx: mpsc::UnboundedSender<Task>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn submit(&self, task: Task) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(task) {
                    warn!("Event worker is gone, dropping {:?}", e.0);
                }
            }
            None => debug!("Handler stopped, dropping {:?}", task),
        }
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct NetworkEventListener {
    queue: Arc<EventQueue>,
}

impl NetworkListener for NetworkEventListener {
    fn event(&self, event: NetworkEvent) {
        match event.kind {
            NetworkEventType::Created | NetworkEventType::Updated => {
                self.queue.submit(Task::Install(event.subject))
            }
            NetworkEventType::Removed => self.queue.submit(Task::Uninstall(event.subject)),
        }
    }
}

pub struct NodeEventListener {
    queue: Arc<EventQueue>,
}

impl NodeListener for NodeEventListener {
    fn event(&self, event: NodeEvent) {
        match event.kind {
            NodeEventType::Complete => self.queue.submit(Task::Backfill(event.subject)),
            // Rules on a node going incomplete are left in place.
            NodeEventType::Incomplete => {}
        }
    }
}

/// Everything the worker needs to turn a task into installer calls.
pub struct Reconciler {
    gate: LeadershipGate,
    networks: Arc<dyn NetworkInventory>,
    nodes: Arc<dyn NodeInventory>,
    tunnel_ports: Arc<dyn TunnelPortResolver>,
    flow_rules: Arc<dyn FlowRuleService>,
    settings: RuleSettings,
}

impl Reconciler {
    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Task>) {
        while let Some(task) = rx.recv().await {
            if let Err(panic) = AssertUnwindSafe(self.process(task)).catch_unwind().await {
                error!("Gateway rule task panicked: {}", panic_reason(panic.as_ref()));
            }
        }
        debug!("Event queue drained");
    }

    async fn process(&self, task: Task) {
        match task {
            Task::Install(network) => {
                if !self.gate.is_leader() {
                    return;
                }
                self.set_gateway_rules(&network, true).await;
            }
            Task::Uninstall(network) => {
                if !self.gate.is_leader() {
                    return;
                }
                self.set_gateway_rules(&network, false).await;
            }
            Task::Backfill(node) => {
                info!("COMPLETE node {} is detected", node.hostname);
                if !self.gate.is_leader() {
                    return;
                }
                for network in self.networks.networks() {
                    self.set_gateway_rules(&network, true).await;
                }
            }
        }
    }

    /// Synthesizes the gateway rule for every complete node and hands each
    /// one to the installer.  Each (network, node) pair runs on its own: an
    /// error or a panic in one pair is logged and counted, and the remaining
    /// pairs still proceed.
    pub async fn set_gateway_rules(&self, network: &Network, install: bool) -> RuleReport {
        let nodes = self.nodes.complete_nodes();
        let owner = self.nodes.node(&network.name);
        let mut report = RuleReport::default();

        for node in &nodes {
            let pair = AssertUnwindSafe(self.set_node_rule(network, node, owner.as_ref(), install))
                .catch_unwind()
                .await;
            match pair {
                Ok(true) => report.applied += 1,
                Ok(false) => report.failed += 1,
                Err(panic) => {
                    error!(
                        "Gateway rule for network {} on {} panicked: {}",
                        network.name,
                        node.hostname,
                        panic_reason(panic.as_ref())
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Gateway rules for {} ({}): {} applied, {} failed",
            network.name,
            if install { "install" } else { "remove" },
            report.applied,
            report.failed
        );
        report
    }

    /// Returns whether the installer accepted the rule.
    async fn set_node_rule(
        &self,
        network: &Network,
        node: &Node,
        owner: Option<&Node>,
        install: bool,
    ) -> bool {
        let rule = match synthesize_for_node(network, node, owner, self.tunnel_ports.as_ref()) {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Skipping gateway rule for network {}: {}", network.name, e);
                return false;
            }
        };
        let request = FlowRuleRequest {
            app_id: self.settings.app_id.clone(),
            device: rule.device,
            selector: rule.selector,
            treatment: rule.treatment,
            priority: self.settings.priority,
            table: self.settings.table,
            install,
        };
        match self.flow_rules.set_rule(request).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to {} gateway rule for network {} on {}: {}",
                    if install { "install" } else { "remove" },
                    network.name,
                    node.int_bridge,
                    e
                );
                false
            }
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// A running gateway handler.  Dropping it without [`deactivate`] leaves the
/// listeners registered; call `deactivate` to shut down cleanly.
///
/// [`deactivate`]: GatewayHandler::deactivate
pub struct GatewayHandler {
    reconciler: Arc<Reconciler>,
    queue: Arc<EventQueue>,
    network_listener: ListenerId,
    node_listener: ListenerId,
    worker: JoinHandle<()>,
}

impl GatewayHandler {
    /// Starts the worker, registers both listeners and runs for leadership.
    /// Must be called from within a tokio runtime.
    pub fn activate(collaborators: Collaborators, settings: RuleSettings) -> Self {
        let Collaborators {
            leadership,
            local_node,
            networks,
            nodes,
            tunnel_ports,
            flow_rules,
        } = collaborators;

        let gate = LeadershipGate::new(leadership, local_node, settings.app_id.name());
        let reconciler = Arc::new(Reconciler {
            gate,
            networks,
            nodes,
            tunnel_ports,
            flow_rules,
            settings,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(EventQueue::new(tx));
        let worker = tokio::spawn(Arc::clone(&reconciler).run(rx));

        let network_listener = reconciler
            .networks
            .add_network_listener(Arc::new(NetworkEventListener {
                queue: Arc::clone(&queue),
            }));
        let node_listener = reconciler.nodes.add_node_listener(Arc::new(NodeEventListener {
            queue: Arc::clone(&queue),
        }));
        reconciler.gate.activate();

        info!("Started");
        Self {
            reconciler,
            queue,
            network_listener,
            node_listener,
            worker,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Stops intake, waits for already queued tasks to finish, then
    /// withdraws from leadership.  Withdrawal comes last on purpose: queued
    /// tasks re-check leadership and would all be dropped otherwise.
    pub async fn deactivate(self) {
        self.reconciler.nodes.remove_node_listener(self.node_listener);
        self.reconciler
            .networks
            .remove_network_listener(self.network_listener);
        self.queue.close();

        if let Err(e) = self.worker.await {
            error!("Event worker terminated abnormally: {}", e);
        }
        self.reconciler.gate.deactivate();

        info!("Stopped");
    }
}
