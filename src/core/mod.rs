/// Version ranges and range collections
pub mod version;

/// Node, partition and replica descriptions
pub mod replica;

/// Failover unit aggregate and table entry
pub mod unit;

/// Derived quorum view over a replica list
pub mod configuration;

pub use configuration::FailoverUnitConfiguration;
pub use unit::{FailoverUnit, ServiceTableEntry};
pub use version::{VersionRange, VersionRangeCollection};
