use crate::{
    core::{replica::GenerationNumber, unit::FailoverUnit},
    message::{ResolveReply, ResolveRequest, ServiceTableUpdate},
};
use futures_util::future::BoxFuture;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Store is not writable")]
    NotWritable,

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Reply generation {reply} is older than known generation {known}")]
    StaleGeneration {
        reply: GenerationNumber,
        known: GenerationNumber,
    },
}

/// Durable persistence of partition records, owned elsewhere. A failed
/// commit is the expected recovery path: the stamped version is left out
/// of the committed set and re-covered by the next successful update.
pub trait DurableStore {
    fn commit<'a>(&'a self, unit: &'a FailoverUnit) -> BoxFuture<'a, Result<(), CommitError>>;
}

/// Outbound fan-out for periodic location broadcasts.
pub trait BroadcastSink: Send + Sync {
    fn broadcast(&self, body: ServiceTableUpdate) -> BoxFuture<'_, ()>;
}

/// Request/reply channel from a consumer to the authority.
pub trait ResolveTransport: Send + Sync {
    fn resolve(&self, request: ResolveRequest) -> BoxFuture<'_, Result<ResolveReply, ResolveError>>;
}
