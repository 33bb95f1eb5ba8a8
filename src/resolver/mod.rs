/// Cache entry and match types
pub mod cache;

use crate::{
    core::{
        replica::{GenerationNumber, PartitionId},
        unit::ServiceTableEntry,
        version::VersionRangeCollection,
    },
    message::{CacheMode, ResolveRequest, ServiceTableUpdate, VersionedPartitionId},
    store::{ResolveError, ResolveTransport},
};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub use cache::{CachedServiceTableEntry, MatchedServiceTableEntry};

/// Client interest in one partition's location.
#[derive(Clone, Copy, Debug)]
pub struct NotificationFilter {
    /// Only notify when the primary role moved, not when secondaries
    /// changed.
    pub check_primary_change_only: bool,
}

struct Inner {
    cache: HashMap<PartitionId, CachedServiceTableEntry>,
    known_versions: VersionRangeCollection,
    end_version: i64,
    generation: GenerationNumber,
    filters: HashMap<PartitionId, Vec<NotificationFilter>>,
}

impl Inner {
    /// Merges one inbound entry set plus the versions it covers, and
    /// matches registered filters against the changes. Both the push
    /// path and the request/reply path funnel through here.
    fn apply(
        &mut self,
        entries: Vec<ServiceTableEntry>,
        covered_versions: &VersionRangeCollection,
        end_version: i64,
    ) -> Vec<MatchedServiceTableEntry> {
        let mut matches = Vec::new();

        for entry in entries {
            let partition = entry.partition;
            let known_version = self.cache.get(&partition).map(CachedServiceTableEntry::version);

            let changed = match self.cache.get_mut(&partition) {
                Some(cached) => cached.merge(entry),
                None => {
                    self.cache
                        .insert(partition, CachedServiceTableEntry::new(entry));
                    true
                }
            };

            if changed {
                if let Some(matched) =
                    self.match_filters(partition, known_version.unwrap_or(i64::MIN))
                {
                    matches.push(matched);
                }
            }
        }

        self.known_versions.merge(covered_versions);
        self.end_version = self.end_version.max(end_version);

        matches
    }

    /// Runs every filter registered for a changed partition. The match
    /// starts at the triggering filter's restrictiveness and relaxes as
    /// less restrictive filters also match, never the other way.
    fn match_filters(
        &self,
        partition: PartitionId,
        known_version: i64,
    ) -> Option<MatchedServiceTableEntry> {
        let filters = self.filters.get(&partition)?;
        let cached = self.cache.get(&partition)?;

        let mut matched: Option<MatchedServiceTableEntry> = None;

        for filter in filters {
            if filter.check_primary_change_only && !cached.did_primary_change(known_version) {
                continue;
            }

            match matched.as_mut() {
                Some(matched) => {
                    matched.update_check_primary_change_only(filter.check_primary_change_only);
                    matched.update_matched_primary_only(filter.check_primary_change_only);
                }
                None => {
                    matched = Some(MatchedServiceTableEntry::new(
                        cached.clone(),
                        filter.check_primary_change_only,
                        filter.check_primary_change_only,
                    ));
                }
            }
        }

        matched
    }
}

/// Consumer-side reconciliation of broadcast and resolve data against a
/// local cache.
///
/// Broadcasts are pushed in through `process_broadcast`; explicit
/// lookups go out through `resolve`. Both paths merge into the same
/// cache and run the same filter matching before anything reaches a
/// client.
pub struct ServiceResolver<T> {
    transport: T,
    inner: Mutex<Inner>,
}

impl<T> ServiceResolver<T>
where
    T: ResolveTransport,
{
    pub fn new(transport: T) -> Self {
        ServiceResolver {
            transport,
            inner: Mutex::new(Inner {
                cache: HashMap::new(),
                known_versions: VersionRangeCollection::default(),
                end_version: 0,
                generation: GenerationNumber::default(),
                filters: HashMap::new(),
            }),
        }
    }

    /// Registers continuous interest in a partition.
    pub async fn register_filter(&self, partition: PartitionId, filter: NotificationFilter) {
        self.inner
            .lock()
            .await
            .filters
            .entry(partition)
            .or_default()
            .push(filter);
    }

    pub async fn cached_entry(&self, partition: PartitionId) -> Option<ServiceTableEntry> {
        self.inner
            .lock()
            .await
            .cache
            .get(&partition)
            .map(|cached| cached.entry().clone())
    }

    pub async fn known_versions(&self) -> VersionRangeCollection {
        self.inner.lock().await.known_versions.clone()
    }

    /// Push path: merges one broadcast into the cache and returns the
    /// filter matches the change raised.
    pub async fn process_broadcast(
        &self,
        body: ServiceTableUpdate,
    ) -> Vec<MatchedServiceTableEntry> {
        let mut inner = self.inner.lock().await;

        if body.generation < inner.generation {
            warn!(
                "Dropping broadcast with stale generation {} (known {})",
                body.generation, inner.generation
            );
            return Vec::new();
        }

        if body.generation > inner.generation {
            info!(
                "Adopting generation {} (was {}); local cache reset",
                body.generation, inner.generation
            );
            inner.cache.clear();
            inner.known_versions.clear();
            inner.generation = body.generation;
        }

        inner.apply(body.entries, &body.covered_versions, body.end_version)
    }

    /// Request/reply path: asks the authority for fresher data on the
    /// given partitions and merges the reply through the same cache
    /// logic as the push path. Returns the post-merge snapshots for the
    /// requested partitions.
    pub async fn resolve(
        &self,
        partitions: &[PartitionId],
        cache_mode: CacheMode,
    ) -> Result<Vec<ServiceTableEntry>, ResolveError> {
        let request = {
            let inner = self.inner.lock().await;

            ResolveRequest {
                partitions: partitions
                    .iter()
                    .map(|partition| VersionedPartitionId {
                        partition: *partition,
                        version: inner
                            .cache
                            .get(partition)
                            .map_or(i64::MIN, CachedServiceTableEntry::version),
                    })
                    .collect(),
                cache_mode,
                known_versions: inner.known_versions.clone(),
            }
        };

        let reply = self.transport.resolve(request).await?;

        let mut inner = self.inner.lock().await;

        if reply.generation < inner.generation {
            return Err(ResolveError::StaleGeneration {
                reply: reply.generation,
                known: inner.generation,
            });
        }

        if reply.generation > inner.generation {
            inner.cache.clear();
            inner.known_versions.clear();
            inner.generation = reply.generation;
        }

        inner.apply(reply.entries, &reply.covered_versions, reply.end_version);

        Ok(partitions
            .iter()
            .filter_map(|partition| inner.cache.get(partition))
            .map(|cached| cached.entry().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{NotificationFilter, ServiceResolver};
    use crate::{
        core::{
            replica::{
                GenerationNumber, NodeInstance, PartitionId, ReplicaDescription, ReplicaRole,
            },
            unit::{FailoverUnit, ServiceTableEntry},
            version::VersionRangeCollection,
        },
        lookup::ServiceLookupTable,
        message::{CacheMode, ResolveReply, ResolveRequest, ServiceTableUpdate},
        store::{ResolveError, ResolveTransport},
    };
    use futures_util::{future::BoxFuture, FutureExt};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Transport looping back into an authority-side lookup table.
    struct Loopback(Arc<Mutex<ServiceLookupTable>>);

    impl ResolveTransport for Loopback {
        fn resolve(
            &self,
            request: ResolveRequest,
        ) -> BoxFuture<'_, Result<ResolveReply, ResolveError>> {
            async move { Ok(self.0.lock().await.resolve(&request, u64::MAX)) }.boxed()
        }
    }

    /// Transport for push-path tests that must never be hit.
    struct NoTransport;

    impl ResolveTransport for NoTransport {
        fn resolve(&self, _: ResolveRequest) -> BoxFuture<'_, Result<ResolveReply, ResolveError>> {
            async { panic!("resolve must not be called") }.boxed()
        }
    }

    fn entry(partition: PartitionId, version: i64, primary: &str) -> ServiceTableEntry {
        ServiceTableEntry {
            partition,
            service_name: "fabric:/app/svc".to_owned(),
            primary_location: Some(primary.to_owned()),
            replica_locations: Vec::new(),
            version,
        }
    }

    fn update(entries: Vec<ServiceTableEntry>, generation: GenerationNumber) -> ServiceTableUpdate {
        let mut covered_versions = VersionRangeCollection::default();
        let mut end_version = 0;
        for entry in &entries {
            covered_versions.add_range(entry.version, entry.version + 1);
            end_version = end_version.max(entry.version + 1);
        }

        ServiceTableUpdate {
            entries,
            covered_versions,
            end_version,
            generation,
        }
    }

    #[tokio::test]
    async fn test_broadcast_merges_and_matches() {
        let resolver = ServiceResolver::new(NoTransport);
        let partition = PartitionId::new_random();
        let generation = GenerationNumber::new(1, 1);

        resolver
            .register_filter(
                partition,
                NotificationFilter {
                    check_primary_change_only: false,
                },
            )
            .await;

        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 1, "node1")], generation))
            .await;
        assert_eq!(matches.len(), 1);

        // Stale version: no cache change, no match.
        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 1, "node2")], generation))
            .await;
        assert!(matches.is_empty());
        assert_eq!(
            resolver
                .cached_entry(partition)
                .await
                .unwrap()
                .primary_location
                .as_deref(),
            Some("node1")
        );

        assert!(resolver.known_versions().await.contains(1));
    }

    #[tokio::test]
    async fn test_primary_only_filter() {
        let resolver = ServiceResolver::new(NoTransport);
        let partition = PartitionId::new_random();
        let generation = GenerationNumber::new(1, 1);

        resolver
            .register_filter(
                partition,
                NotificationFilter {
                    check_primary_change_only: true,
                },
            )
            .await;

        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 1, "node1")], generation))
            .await;
        assert_eq!(matches.len(), 1);
        assert!(matches[0].matched_primary_only());

        // Same primary, higher version: secondaries-only change.
        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 2, "node1")], generation))
            .await;
        assert!(matches.is_empty());

        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 3, "node2")], generation))
            .await;
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_filters_relax_the_match() {
        let resolver = ServiceResolver::new(NoTransport);
        let partition = PartitionId::new_random();
        let generation = GenerationNumber::new(1, 1);

        resolver
            .register_filter(
                partition,
                NotificationFilter {
                    check_primary_change_only: true,
                },
            )
            .await;
        resolver
            .register_filter(
                partition,
                NotificationFilter {
                    check_primary_change_only: false,
                },
            )
            .await;

        let matches = resolver
            .process_broadcast(update(vec![entry(partition, 1, "node1")], generation))
            .await;

        // The primary-only filter triggered first, but the broader
        // filter relaxed the match.
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].check_primary_change_only());
        assert!(!matches[0].matched_primary_only());
    }

    #[tokio::test]
    async fn test_generation_handling() {
        let resolver = ServiceResolver::new(NoTransport);
        let partition = PartitionId::new_random();

        resolver
            .process_broadcast(update(
                vec![entry(partition, 5, "node1")],
                GenerationNumber::new(1, 2),
            ))
            .await;

        // Stale generation: dropped outright.
        resolver
            .process_broadcast(update(
                vec![entry(partition, 9, "node2")],
                GenerationNumber::new(1, 1),
            ))
            .await;
        assert_eq!(resolver.cached_entry(partition).await.unwrap().version, 5);

        // Newer generation: cache reset, lower versions acceptable again.
        resolver
            .process_broadcast(update(
                vec![entry(partition, 2, "node3")],
                GenerationNumber::new(2, 1),
            ))
            .await;

        let cached = resolver.cached_entry(partition).await.unwrap();
        assert_eq!(cached.version, 2);
        assert_eq!(cached.primary_location.as_deref(), Some("node3"));
        assert!(!resolver.known_versions().await.contains(5));
    }

    #[tokio::test]
    async fn test_resolve_round_trip() {
        let table = Arc::new(Mutex::new(ServiceLookupTable::new(
            0,
            GenerationNumber::new(1, 1),
        )));

        let mut unit = FailoverUnit::new(PartitionId::new_random(), "fabric:/app/svc");
        unit.add_replica(ReplicaDescription::new(
            NodeInstance::new(1, 1),
            1,
            ReplicaRole::Primary,
            "node1:530",
        ));

        {
            let mut table = table.lock().await;
            table.update_lookup_version(&mut unit);
            table.update(&unit);
        }

        let resolver = ServiceResolver::new(Loopback(table.clone()));

        let entries = resolver
            .resolve(&[unit.id()], CacheMode::UseCached)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].primary_location.as_deref(), Some("node1:530"));

        // Authority moves the primary; a refresh picks it up.
        {
            let mut table = table.lock().await;
            unit.replicas_mut()[0].location = "node2:530".to_owned();
            table.update_lookup_version(&mut unit);
            table.update(&unit);
        }

        let entries = resolver
            .resolve(&[unit.id()], CacheMode::Refresh)
            .await
            .unwrap();
        assert_eq!(entries[0].primary_location.as_deref(), Some("node2:530"));
        assert!(resolver.known_versions().await.contains(1));
    }
}
