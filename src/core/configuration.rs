use crate::core::replica::{ReplicaDescription, ReplicaRole, ReplicaStatus};

/// Read-only quorum view derived from a partition's replica list.
///
/// Owns a cloned snapshot of the in-configuration replicas; it is never
/// patched when the underlying list changes, only rebuilt. All counts
/// come from a single pass over the snapshot at construction.
#[derive(Clone, Debug)]
pub struct FailoverUnitConfiguration {
    is_current: bool,
    replicas: Vec<ReplicaDescription>,
    primary: Option<usize>,
    secondary_count: usize,
    up_count: usize,
    offline_count: usize,
    available_count: usize,
    down_secondary_count: usize,
    stable_count: usize,
    stand_by_count: usize,
    dropped_count: usize,
    deleted_count: usize,
}

impl FailoverUnitConfiguration {
    /// Builds the view from a snapshot of the replica list.
    ///
    /// Panics when the resulting configuration is non-empty but has no
    /// primary: who is primary is decided upstream, and its absence here
    /// means a broken invariant, not a recoverable condition.
    pub fn new(is_current: bool, replicas: &[ReplicaDescription]) -> Self {
        let mut configuration = FailoverUnitConfiguration {
            is_current,
            replicas: Vec::new(),
            primary: None,
            secondary_count: 0,
            up_count: 0,
            offline_count: 0,
            available_count: 0,
            down_secondary_count: 0,
            stable_count: 0,
            stand_by_count: 0,
            dropped_count: 0,
            deleted_count: 0,
        };

        for replica in replicas {
            if replica.role(is_current).in_configuration() {
                configuration.add_replica(replica.clone());
            }
        }

        assert!(
            configuration.replicas.is_empty() || configuration.primary.is_some(),
            "non-empty configuration without a primary"
        );

        configuration
    }

    fn add_replica(&mut self, replica: ReplicaDescription) {
        match replica.role(self.is_current) {
            ReplicaRole::Primary => {
                assert!(self.primary.is_none(), "configuration with two primaries");
                self.primary = Some(self.replicas.len());
            }
            ReplicaRole::Secondary => {
                self.secondary_count += 1;
                if !replica.is_up {
                    self.down_secondary_count += 1;
                }
            }
            _ => unreachable!("replica outside of configuration"),
        }

        if replica.is_up {
            self.up_count += 1;
        } else if !replica.is_dropped() {
            self.offline_count += 1;
        }

        if replica.is_available() {
            self.available_count += 1;
        }

        if replica.is_stable() {
            self.stable_count += 1;
        }

        match replica.status {
            ReplicaStatus::StandBy => self.stand_by_count += 1,
            ReplicaStatus::Dropped => self.dropped_count += 1,
            ReplicaStatus::Deleted => self.deleted_count += 1,
            ReplicaStatus::Ready => {}
        }

        self.replicas.push(replica);
    }

    pub fn is_current_configuration(&self) -> bool {
        self.is_current
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// The sole primary, if the configuration is non-empty.
    pub fn primary(&self) -> Option<&ReplicaDescription> {
        self.primary.map(|idx| &self.replicas[idx])
    }

    pub fn replicas(&self) -> &[ReplicaDescription] {
        &self.replicas
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn secondary_count(&self) -> usize {
        self.secondary_count
    }

    pub fn up_count(&self) -> usize {
        self.up_count
    }

    pub fn offline_count(&self) -> usize {
        self.offline_count
    }

    pub fn available_count(&self) -> usize {
        self.available_count
    }

    pub fn down_secondary_count(&self) -> usize {
        self.down_secondary_count
    }

    pub fn stable_replica_count(&self) -> usize {
        self.stable_count
    }

    pub fn stand_by_replica_count(&self) -> usize {
        self.stand_by_count
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped_count
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    pub fn write_quorum_size(&self) -> usize {
        self.replica_count() / 2 + 1
    }

    pub fn read_quorum_size(&self) -> usize {
        (self.replica_count() + 1) / 2
    }

    pub fn is_read_quorum_lost(&self) -> bool {
        self.dropped_count >= self.write_quorum_size()
    }
}
