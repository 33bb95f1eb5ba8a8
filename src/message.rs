use crate::core::{
    replica::{GenerationNumber, NodeInstance, PartitionId, ReplicaDescription},
    unit::ServiceTableEntry,
    version::VersionRangeCollection,
};
use bincode::Error;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

/// One node's batched "these replicas are down" report.
#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ReplicaDownReport {
    pub sender: NodeInstance,
    pub replicas: HashMap<PartitionId, ReplicaDescription>,
}

/// Best-effort acknowledgment. Partitions missing from `processed` were
/// not handled in time and are expected to be resent by the reporter.
#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ReplicaDownReply {
    pub processed: HashMap<PartitionId, ReplicaDescription>,
    pub generation: GenerationNumber,
}

/// Periodic broadcast body: entries for committed versions the previous
/// broadcast did not cover.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ServiceTableUpdate {
    pub entries: Vec<ServiceTableEntry>,
    pub covered_versions: VersionRangeCollection,
    pub end_version: i64,
    pub generation: GenerationNumber,
}

/// How a consumer wants its resolve handled.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum CacheMode {
    /// Local cache entries are acceptable.
    UseCached,
    /// Always fetch fresher data than the carried version.
    Refresh,
}

/// Partition id plus the highest version the consumer has seen for it.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct VersionedPartitionId {
    pub partition: PartitionId,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ResolveRequest {
    pub partitions: Vec<VersionedPartitionId>,
    pub cache_mode: CacheMode,
    pub known_versions: VersionRangeCollection,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct ResolveReply {
    pub entries: Vec<ServiceTableEntry>,
    pub covered_versions: VersionRangeCollection,
    pub end_version: i64,
    pub generation: GenerationNumber,
}

#[derive(Serialize, Deserialize, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum Message {
    ReplicaDown(ReplicaDownReport),
    ReplicaDownReply(ReplicaDownReply),
    ServiceTableUpdate(ServiceTableUpdate),
    Resolve(ResolveRequest),
    ResolveReply(ResolveReply),
}

#[derive(Default)]
pub struct BincodeCodec;

impl<I> Encoder<I> for BincodeCodec
where
    I: Serialize,
{
    type Error = Error;

    fn encode(&mut self, item: I, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&bincode::serialize(&item)?);
        Ok(())
    }
}

impl Decoder for BincodeCodec {
    type Item = Message;

    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            Ok(None)
        } else {
            Ok(Some(bincode::deserialize(&src.split_to(src.len()))?))
        }
    }
}
