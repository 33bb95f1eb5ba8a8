use crate::core::{
    configuration::FailoverUnitConfiguration,
    replica::{PartitionId, ReplicaDescription, ReplicaRole},
};
use serde::{Deserialize, Serialize};

/// The partition aggregate: an ordered replica list plus the lookup
/// version stamped by the service lookup table.
///
/// Ownership of the record (durable persistence, reconfiguration state
/// machine) lives with the external authority; this type carries only
/// what placement bookkeeping and synchronization need.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FailoverUnit {
    id: PartitionId,
    service_name: String,
    replicas: Vec<ReplicaDescription>,
    lookup_version: i64,
}

impl FailoverUnit {
    pub fn new(id: PartitionId, service_name: &str) -> Self {
        FailoverUnit {
            id,
            service_name: service_name.to_owned(),
            replicas: Vec::new(),
            lookup_version: 0,
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn replicas(&self) -> &[ReplicaDescription] {
        &self.replicas
    }

    pub fn replicas_mut(&mut self) -> &mut [ReplicaDescription] {
        &mut self.replicas
    }

    pub fn add_replica(&mut self, replica: ReplicaDescription) {
        self.replicas.push(replica);
    }

    pub fn remove_replica(&mut self, replica_id: u64) -> Option<ReplicaDescription> {
        let idx = self.replicas.iter().position(|r| r.replica_id == replica_id)?;
        Some(self.replicas.remove(idx))
    }

    pub fn lookup_version(&self) -> i64 {
        self.lookup_version
    }

    pub fn set_lookup_version(&mut self, version: i64) {
        self.lookup_version = version;
    }

    /// Derived quorum view over the current configuration. Rebuilt on
    /// every call; the view is a snapshot, never patched in place.
    pub fn current_configuration(&self) -> FailoverUnitConfiguration {
        FailoverUnitConfiguration::new(true, &self.replicas)
    }

    /// Derived quorum view over the previous configuration.
    pub fn previous_configuration(&self) -> FailoverUnitConfiguration {
        FailoverUnitConfiguration::new(false, &self.replicas)
    }

    /// Externally visible snapshot shipped to consumers.
    pub fn service_table_entry(&self) -> ServiceTableEntry {
        let primary_location = self
            .replicas
            .iter()
            .find(|r| r.current_role == ReplicaRole::Primary && r.is_available())
            .map(|r| r.location.clone());

        let replica_locations = self
            .replicas
            .iter()
            .filter(|r| r.current_role == ReplicaRole::Secondary && r.is_available())
            .map(|r| r.location.clone())
            .collect();

        ServiceTableEntry {
            partition: self.id,
            service_name: self.service_name.clone(),
            primary_location,
            replica_locations,
            version: self.lookup_version,
        }
    }
}

/// Snapshot of one partition's replica locations at a lookup version.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct ServiceTableEntry {
    pub partition: PartitionId,
    pub service_name: String,
    pub primary_location: Option<String>,
    pub replica_locations: Vec<String>,
    pub version: i64,
}
