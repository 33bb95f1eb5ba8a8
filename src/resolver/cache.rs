use crate::core::unit::ServiceTableEntry;

/// Consumer-side cache slot for one partition. Entries only move
/// forward in version; the slot remembers the version at which the
/// primary last moved so primary-only interest can be answered without
/// re-deriving anything.
#[derive(Clone, Debug)]
pub struct CachedServiceTableEntry {
    entry: ServiceTableEntry,
    last_primary_change_version: i64,
}

impl CachedServiceTableEntry {
    pub fn new(entry: ServiceTableEntry) -> Self {
        let last_primary_change_version = entry.version;
        CachedServiceTableEntry {
            entry,
            last_primary_change_version,
        }
    }

    pub fn entry(&self) -> &ServiceTableEntry {
        &self.entry
    }

    pub fn version(&self) -> i64 {
        self.entry.version
    }

    /// Applies a fresher snapshot; stale and duplicate versions are
    /// ignored. Returns whether the slot changed.
    pub fn merge(&mut self, entry: ServiceTableEntry) -> bool {
        if entry.version <= self.entry.version {
            return false;
        }

        if entry.primary_location != self.entry.primary_location {
            self.last_primary_change_version = entry.version;
        }

        self.entry = entry;
        true
    }

    /// Whether the primary moved after the version the consumer last
    /// acted on.
    pub fn did_primary_change(&self, known_version: i64) -> bool {
        self.last_primary_change_version > known_version
    }
}

/// A cached entry matched against one or more client filters, plus the
/// restrictiveness the eventual notification must honor.
///
/// Both flags start at the triggering filter's value and only ever relax
/// toward `false` when a less restrictive filter also matches the same
/// change; they are never re-tightened, since the notification must
/// satisfy the least restrictive of all matched filters.
#[derive(Clone, Debug)]
pub struct MatchedServiceTableEntry {
    cached: CachedServiceTableEntry,
    check_primary_change_only: bool,
    matched_primary_only: bool,
}

impl MatchedServiceTableEntry {
    pub fn new(
        cached: CachedServiceTableEntry,
        check_primary_change_only: bool,
        matched_primary_only: bool,
    ) -> Self {
        MatchedServiceTableEntry {
            cached,
            check_primary_change_only,
            matched_primary_only,
        }
    }

    pub fn check_primary_change_only(&self) -> bool {
        self.check_primary_change_only
    }

    /// Informational: the match was produced by a primary-only filter.
    pub fn matched_primary_only(&self) -> bool {
        self.matched_primary_only
    }

    pub fn update_check_primary_change_only(&mut self, flag: bool) {
        self.check_primary_change_only &= flag;
    }

    pub fn update_matched_primary_only(&mut self, flag: bool) {
        self.matched_primary_only &= flag;
    }

    /// The snapshot to hand to the client, if anything should be handed
    /// at all: under primary-only interest, only an actual primary move
    /// produces a result.
    pub fn try_get_service_table_entry(&self, known_version: i64) -> Option<&ServiceTableEntry> {
        if self.check_primary_change_only && !self.cached.did_primary_change(known_version) {
            return None;
        }

        Some(self.cached.entry())
    }
}
