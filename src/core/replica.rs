use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable node identity.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub u64);

/// A node identity plus its incarnation counter. Two instances with the
/// same id but different incarnations are different nodes for protocol
/// purposes.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeInstance {
    pub id: NodeId,
    pub incarnation: u64,
}

impl NodeInstance {
    pub fn new(id: u64, incarnation: u64) -> Self {
        NodeInstance {
            id: NodeId(id),
            incarnation,
        }
    }
}

impl fmt::Display for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id.0, self.incarnation)
    }
}

/// Failover unit identity.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PartitionId(pub Uuid);

impl PartitionId {
    pub fn new_random() -> Self {
        PartitionId(Uuid::new_v4())
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Epoch of the authoritative controller. Consumers reject data stamped
/// with a generation older than the one they have seen.
#[derive(
    Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default,
)]
pub struct GenerationNumber {
    pub owner: u64,
    pub number: u64,
}

impl GenerationNumber {
    pub fn new(owner: u64, number: u64) -> Self {
        GenerationNumber { owner, number }
    }
}

impl fmt::Display for GenerationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.number)
    }
}

/// Role a replica plays within one configuration.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReplicaRole {
    /// Not part of the configuration.
    None,
    /// Receiving state, not yet voting.
    Idle,
    Secondary,
    Primary,
}

impl ReplicaRole {
    pub fn in_configuration(self) -> bool {
        matches!(self, ReplicaRole::Secondary | ReplicaRole::Primary)
    }
}

/// Lifecycle state of a replica.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReplicaStatus {
    Ready,
    StandBy,
    Dropped,
    Deleted,
}

/// Placement and state of a single replica, as reported by its node.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ReplicaDescription {
    pub node: NodeInstance,
    pub replica_id: u64,
    pub current_role: ReplicaRole,
    pub previous_role: ReplicaRole,
    pub status: ReplicaStatus,
    pub is_up: bool,
    pub is_to_be_dropped: bool,
    /// Endpoint clients use to reach the replica.
    pub location: String,
}

impl ReplicaDescription {
    pub fn new(node: NodeInstance, replica_id: u64, role: ReplicaRole, location: &str) -> Self {
        ReplicaDescription {
            node,
            replica_id,
            current_role: role,
            previous_role: ReplicaRole::None,
            status: ReplicaStatus::Ready,
            is_up: true,
            is_to_be_dropped: false,
            location: location.to_owned(),
        }
    }

    pub fn role(&self, current_configuration: bool) -> ReplicaRole {
        if current_configuration {
            self.current_role
        } else {
            self.previous_role
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self.status, ReplicaStatus::Dropped | ReplicaStatus::Deleted)
    }

    pub fn is_available(&self) -> bool {
        self.is_up && self.status == ReplicaStatus::Ready
    }

    pub fn is_stable(&self) -> bool {
        self.is_available() && !self.is_to_be_dropped
    }
}
