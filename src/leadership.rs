//! Cluster leadership gate.
//!
//! Only the leader for the application's topic may program the dataplane.
//! The gate never caches: every call to [`LeadershipGate::is_leader`] asks
//! the leadership service again, because leadership can move while work is
//! sitting in the queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Identity of a controller cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The cluster leadership election collaborator.
pub trait LeadershipService: Send + Sync {
    /// Registers the local member as a candidate for `topic`.
    fn run_for_leadership(&self, topic: &str);

    /// Withdraws the local member's candidacy for `topic`.
    fn withdraw(&self, topic: &str);

    /// Current leader for `topic`, if any.
    fn leader(&self, topic: &str) -> Option<NodeId>;
}

pub struct LeadershipGate {
    service: Arc<dyn LeadershipService>,
    local: NodeId,
    topic: String,
}

impl LeadershipGate {
    pub fn new(service: Arc<dyn LeadershipService>, local: NodeId, topic: impl Into<String>) -> Self {
        Self {
            service,
            local,
            topic: topic.into(),
        }
    }

    pub fn activate(&self) {
        self.service.run_for_leadership(&self.topic);
    }

    pub fn deactivate(&self) {
        self.service.withdraw(&self.topic);
    }

    pub fn is_leader(&self) -> bool {
        self.service.leader(&self.topic).as_ref() == Some(&self.local)
    }
}

/// Single-member leadership for running the daemon without a cluster.
///
/// The first candidate for a topic leads it until it withdraws.
pub struct LocalLeadership {
    local: NodeId,
    leaders: Mutex<HashMap<String, NodeId>>,
}

impl LocalLeadership {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            leaders: Mutex::new(HashMap::new()),
        }
    }
}

impl LeadershipService for LocalLeadership {
    fn run_for_leadership(&self, topic: &str) {
        let mut leaders = self.leaders.lock().unwrap_or_else(PoisonError::into_inner);
        let leader = leaders
            .entry(topic.to_string())
            .or_insert_with(|| self.local.clone());
        if *leader == self.local {
            info!("Acquired leadership for {} as {}", topic, self.local);
        }
    }

    fn withdraw(&self, topic: &str) {
        let mut leaders = self.leaders.lock().unwrap_or_else(PoisonError::into_inner);
        match leaders.get(topic) {
            Some(leader) if *leader == self.local => {
                leaders.remove(topic);
                info!("Withdrew leadership for {}", topic);
            }
            Some(leader) => warn!("Cannot withdraw from {}: led by {}", topic, leader),
            None => {}
        }
    }

    fn leader(&self, topic: &str) -> Option<NodeId> {
        self.leaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }
}
