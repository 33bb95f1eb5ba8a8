/// Periodic broadcast job
pub mod broadcast;

use crate::{
    core::{
        replica::{GenerationNumber, PartitionId},
        unit::{FailoverUnit, ServiceTableEntry},
        version::VersionRangeCollection,
    },
    message::{CacheMode, ResolveReply, ResolveRequest, ServiceTableUpdate},
    store::DurableStore,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

pub use broadcast::Broadcaster;

/// One page of entries produced for a catching-up consumer.
#[derive(Debug)]
pub struct LookupUpdates {
    pub entries: Vec<ServiceTableEntry>,
    /// Sub-collection of `committed - known` actually covered by this
    /// page; the consumer merges it into its known set and asks again
    /// for the rest.
    pub covered_versions: VersionRangeCollection,
    pub end_version: i64,
}

/// Assigns monotonic lookup versions to partition updates and computes
/// broadcast deltas from the committed version set.
///
/// Not internally thread-safe: the owning authority serializes mutation
/// under its own lock, and broadcast snapshots are cheap clones taken
/// under that lock.
pub struct ServiceLookupTable {
    /// Broadcast entry per live partition.
    entries: HashMap<PartitionId, ServiceTableEntry>,
    /// Committed version -> partition owning it.
    index: BTreeMap<i64, PartitionId>,
    /// Every durably committed version.
    committed: VersionRangeCollection,
    /// Versions stamped onto updates whose persistence failed, per unit.
    /// Folded into `committed` once a later update for the same unit
    /// succeeds, closing the gap.
    failed: HashMap<PartitionId, Vec<i64>>,
    /// `committed` as of the previous broadcast tick.
    broadcast_snapshot: VersionRangeCollection,
    end_version: i64,
    generation: GenerationNumber,
}

impl ServiceLookupTable {
    pub fn new(initial_version: i64, generation: GenerationNumber) -> Self {
        ServiceLookupTable {
            entries: HashMap::new(),
            index: BTreeMap::new(),
            committed: VersionRangeCollection::new(initial_version),
            failed: HashMap::new(),
            broadcast_snapshot: VersionRangeCollection::new(initial_version),
            end_version: initial_version,
            generation,
        }
    }

    pub fn end_version(&self) -> i64 {
        self.end_version
    }

    pub fn generation(&self) -> GenerationNumber {
        self.generation
    }

    pub fn committed_versions(&self) -> &VersionRangeCollection {
        &self.committed
    }

    pub fn entry(&self, id: PartitionId) -> Option<&ServiceTableEntry> {
        self.entries.get(&id)
    }

    /// Stamps the unit with the current end version and increments it.
    ///
    /// Sole writer of `end_version`. Must be invoked exactly once per
    /// logical update; the caller's per-partition update path is already
    /// serialized.
    pub fn update_lookup_version(&mut self, unit: &mut FailoverUnit) {
        unit.set_lookup_version(self.end_version);
        self.end_version += 1;
    }

    /// Success path: records the stamped version as committed and
    /// refreshes the broadcast entry.
    pub fn update(&mut self, unit: &FailoverUnit) {
        let version = unit.lookup_version();

        self.committed.add_range(version, version + 1);

        // A later success covers this unit's earlier failed stamps.
        if let Some(gaps) = self.failed.remove(&unit.id()) {
            for gap in gaps {
                self.committed.add_range(gap, gap + 1);
            }
        }

        if let Some(superseded) = self.entries.insert(unit.id(), unit.service_table_entry()) {
            self.index.remove(&superseded.version);
        }
        self.index.insert(version, unit.id());
    }

    /// Persistence of the stamped version failed: the version is left
    /// out of the committed set. The expected recovery path, not an
    /// error.
    pub fn on_update_failed(&mut self, unit: &FailoverUnit) {
        debug!(
            "Update of {} failed to persist; version {} left uncommitted",
            unit.id(),
            unit.lookup_version()
        );

        self.failed
            .entry(unit.id())
            .or_default()
            .push(unit.lookup_version());
    }

    /// Drops a deleted unit's versions from the committed set so its
    /// entry stops being shipped.
    pub fn remove_entry(&mut self, unit: &FailoverUnit) {
        if let Some(entry) = self.entries.remove(&unit.id()) {
            self.index.remove(&entry.version);
            self.committed.remove_version(entry.version);
        }

        self.failed.remove(&unit.id());
    }

    /// Computes `committed - known` and greedily fills a page of entries
    /// for the missing versions.
    ///
    /// `page_size_limit` is a byte budget; a page always carries at
    /// least one entry even when that entry alone exceeds the budget, so
    /// a straggler is guaranteed progress. An entry is never returned
    /// for a version present in `known`.
    pub fn get_updates(
        &self,
        page_size_limit: u64,
        known: &VersionRangeCollection,
    ) -> LookupUpdates {
        let mut missing = self.committed.clone();
        missing.remove_collection(known);

        let mut entries = Vec::new();
        let mut used = 0;
        let mut truncated_at = None;

        'fill: for range in missing.ranges() {
            for (version, id) in self.index.range(range.start()..range.end()) {
                let entry = &self.entries[id];
                let size = bincode::serialized_size(entry)
                    .expect("table entry is serializable");

                if !entries.is_empty() && used + size > page_size_limit {
                    truncated_at = Some(*version);
                    break 'fill;
                }

                entries.push(entry.clone());
                used += size;
            }
        }

        let covered_versions = match truncated_at {
            Some(version) => {
                missing.split(version);
                missing
            }
            None => missing,
        };

        LookupUpdates {
            entries,
            covered_versions,
            end_version: self.end_version,
        }
    }

    /// Serves one explicit resolve request. Targeted partitions are
    /// answered from the table when the consumer's version is stale (or
    /// unconditionally under `Refresh`); an untargeted request pages
    /// through everything the consumer is missing.
    pub fn resolve(&self, request: &ResolveRequest, page_size_limit: u64) -> ResolveReply {
        if request.partitions.is_empty() {
            let updates = self.get_updates(page_size_limit, &request.known_versions);

            return ResolveReply {
                entries: updates.entries,
                covered_versions: updates.covered_versions,
                end_version: updates.end_version,
                generation: self.generation,
            };
        }

        let mut entries = Vec::new();
        let mut covered_versions = VersionRangeCollection::default();

        for requested in &request.partitions {
            let Some(entry) = self.entries.get(&requested.partition) else {
                debug!("Resolve for unknown partition {}", requested.partition);
                continue;
            };

            if request.cache_mode == CacheMode::Refresh || entry.version > requested.version {
                covered_versions.add_range(entry.version, entry.version + 1);
                entries.push(entry.clone());
            }
        }

        ResolveReply {
            entries,
            covered_versions,
            end_version: self.end_version,
            generation: self.generation,
        }
    }

    /// Packages the periodic broadcast: the delta between the committed
    /// set and the snapshot recorded at the previous tick. Bounded by
    /// what changed since then, independent of total partition count.
    /// Returns `None` when nothing changed.
    pub fn try_get_update_body(&mut self) -> Option<ServiceTableUpdate> {
        let mut delta = self.committed.clone();
        delta.remove_collection(&self.broadcast_snapshot);

        if delta.is_empty() {
            return None;
        }

        let mut entries = Vec::new();
        for range in delta.ranges() {
            for (_, id) in self.index.range(range.start()..range.end()) {
                entries.push(self.entries[id].clone());
            }
        }

        self.broadcast_snapshot = self.committed.clone();

        Some(ServiceTableUpdate {
            entries,
            covered_versions: delta,
            end_version: self.end_version,
            generation: self.generation,
        })
    }
}

/// Drives one logical update end to end: stamp, commit durably, then
/// record the outcome. Returns whether the update committed; a failed
/// commit is logged and recovered by the unit's next successful update,
/// never surfaced to the caller as an error.
pub async fn commit_update<S>(
    table: &Mutex<ServiceLookupTable>,
    store: &S,
    unit: &mut FailoverUnit,
) -> bool
where
    S: DurableStore,
{
    table.lock().await.update_lookup_version(unit);

    match store.commit(unit).await {
        Ok(()) => {
            table.lock().await.update(unit);
            true
        }
        Err(e) => {
            warn!("Commit of {} failed: {}", unit.id(), e);
            table.lock().await.on_update_failed(unit);
            false
        }
    }
}
