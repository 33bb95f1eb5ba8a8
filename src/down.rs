use crate::{
    config::Config,
    core::replica::{GenerationNumber, NodeInstance, PartitionId, ReplicaDescription},
    dispatch::PartitionDispatcher,
    message::{ReplicaDownReply, ReplicaDownReport},
};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinHandle, time};

/// Applies one replica-down report to its owning partition.
pub trait ReplicaDownHandler: Send + Sync {
    /// Returns the updated description, or `None` when the partition no
    /// longer exists (already deleted). A missing partition is dropped
    /// from the batch; the reporting node's own retry cycle recovers it.
    fn process(
        &self,
        id: PartitionId,
        replica: ReplicaDescription,
    ) -> BoxFuture<'_, Option<ReplicaDescription>>;
}

struct State {
    pending: HashSet<PartitionId>,
    processed: HashMap<PartitionId, ReplicaDescription>,
    completed: bool,
    reply: Option<oneshot::Sender<ReplicaDownReply>>,
    timer: Option<JoinHandle<()>>,
}

/// Coordinates one multi-partition failure report, replying best-effort
/// within a timeout instead of blocking on any single stuck partition.
///
/// Lives only for the duration of one report's handling: the reply is
/// sent either when every partition reported an outcome or when the
/// timer fires, whichever comes first. Partitions still pending at the
/// timeout are simply omitted from the reply, which the reporter reads
/// as "retry these".
pub struct ReplicaDownOperation {
    sender: NodeInstance,
    generation: GenerationNumber,
    state: Mutex<State>,
}

impl ReplicaDownOperation {
    pub fn new(
        sender: NodeInstance,
        generation: GenerationNumber,
    ) -> (Arc<Self>, oneshot::Receiver<ReplicaDownReply>) {
        let (reply_tx, reply_rx) = oneshot::channel();

        let operation = Arc::new(ReplicaDownOperation {
            sender,
            generation,
            state: Mutex::new(State {
                pending: HashSet::new(),
                processed: HashMap::new(),
                completed: false,
                reply: Some(reply_tx),
                timer: None,
            }),
        });

        (operation, reply_rx)
    }

    /// Registers every reported partition as pending, arms the timer
    /// (half the reporter's retry interval, floored at one second), and
    /// fans each partition out into its own serialized queue.
    pub fn start<H>(
        self: &Arc<Self>,
        report: ReplicaDownReport,
        dispatcher: &PartitionDispatcher,
        handler: Arc<H>,
        config: &Config,
    ) where
        H: ReplicaDownHandler + 'static,
    {
        info!(
            "Processing replica down report from {} covering {} partitions",
            report.sender,
            report.replicas.len()
        );

        {
            let mut state = self.state.lock();

            if report.replicas.is_empty() {
                self.complete_locked(&mut state, "empty report");
                return;
            }

            state.pending.extend(report.replicas.keys().copied());

            let timeout = Duration::from_secs((config.message_retry_interval / 2).max(1));
            let operation = self.clone();
            state.timer = Some(tokio::spawn(async move {
                time::sleep(timeout).await;
                operation.on_timeout();
            }));
        }

        for (id, replica) in report.replicas {
            let operation = self.clone();
            let handler = handler.clone();

            dispatcher.dispatch(id, async move {
                match handler.process(id, replica).await {
                    Some(outcome) => operation.add_result(id, outcome),
                    None => {
                        warn!("Partition {} not found; dropped from batch", id);
                        operation.drop_pending(id);
                    }
                }
            });
        }
    }

    /// Records one partition's outcome. A result arriving after the
    /// operation completed (a task outliving the timeout) is a no-op; a
    /// result for a partition that was never pending is a broken caller
    /// contract.
    pub fn add_result(&self, id: PartitionId, outcome: ReplicaDescription) {
        let mut state = self.state.lock();

        if state.completed {
            return;
        }

        assert!(
            state.pending.remove(&id),
            "result for partition {} which was not pending",
            id
        );
        state.processed.insert(id, outcome);

        if state.pending.is_empty() {
            self.complete_locked(&mut state, "all partitions processed");
        }
    }

    fn drop_pending(&self, id: PartitionId) {
        let mut state = self.state.lock();

        if state.completed {
            return;
        }

        assert!(
            state.pending.remove(&id),
            "dropped partition {} which was not pending",
            id
        );

        if state.pending.is_empty() {
            self.complete_locked(&mut state, "all partitions processed");
        }
    }

    fn on_timeout(&self) {
        let mut state = self.state.lock();

        if !state.completed {
            self.complete_locked(&mut state, "timeout");
        }
    }

    /// Completes with whatever has been processed so far. Only the first
    /// of {all-done, timeout} wins; a second explicit call is a broken
    /// caller contract.
    pub fn complete(&self) {
        let mut state = self.state.lock();

        assert!(!state.completed, "operation completed twice");
        self.complete_locked(&mut state, "explicit");
    }

    fn complete_locked(&self, state: &mut State, reason: &str) {
        debug_assert!(!state.completed);
        state.completed = true;

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        info!(
            "Replying to {} with {} processed, {} pending omitted ({})",
            self.sender,
            state.processed.len(),
            state.pending.len(),
            reason
        );

        let reply = ReplicaDownReply {
            processed: std::mem::take(&mut state.processed),
            generation: self.generation,
        };

        if let Some(tx) = state.reply.take() {
            tx.send(reply).ok();
        }
    }
}
