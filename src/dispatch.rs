use crate::core::replica::PartitionId;
use parking_lot::Mutex;
use std::{collections::HashMap, future::Future, pin::Pin};
use tokio::sync::mpsc::{self, UnboundedSender};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Keyed actor map: each partition gets an independent FIFO queue drained
/// by its own task, so work within one partition is strictly serialized
/// while different partitions run in parallel. There is no ordering
/// guarantee across partitions.
#[derive(Default)]
pub struct PartitionDispatcher {
    queues: Mutex<HashMap<PartitionId, UnboundedSender<Task>>>,
}

impl PartitionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task into the partition's serialized queue, creating
    /// the queue on first use.
    pub fn dispatch<F>(&self, id: PartitionId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut queues = self.queues.lock();

        let sender = queues.entry(id).or_insert_with(|| Self::spawn_queue(id));

        if let Err(rejected) = sender.send(Box::pin(task)) {
            // Drain task is gone; start a fresh queue and retry once.
            let sender = Self::spawn_queue(id);
            sender
                .send(rejected.0)
                .expect("freshly spawned queue rejected task");
            queues.insert(id, sender);
        }
    }

    /// Tears down a partition's queue; queued tasks still run, new
    /// dispatches recreate the queue.
    pub fn remove(&self, id: PartitionId) {
        self.queues.lock().remove(&id);
    }

    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    fn spawn_queue(id: PartitionId) -> UnboundedSender<Task> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        tokio::spawn(async move {
            debug!("Starting serialized queue for partition {}", id);

            while let Some(task) = rx.recv().await {
                task.await;
            }

            debug!("Serialized queue for partition {} drained", id);
        });

        tx
    }
}

#[cfg(test)]
mod tests {
    use super::PartitionDispatcher;
    use crate::core::replica::PartitionId;
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    #[tokio::test]
    async fn test_fifo_within_partition() {
        let dispatcher = PartitionDispatcher::new();
        let id = PartitionId::new_random();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..100u32 {
            let tx = tx.clone();
            dispatcher.dispatch(id, async move {
                tx.send(i).unwrap();
            });
        }
        dispatcher.dispatch(id, async move {
            done_tx.send(()).unwrap();
        });

        done_rx.await.unwrap();

        for i in 0..100u32 {
            assert_eq!(rx.recv().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_partitions_run_independently() {
        let dispatcher = Arc::new(PartitionDispatcher::new());

        let blocked = PartitionId::new_random();
        let free = PartitionId::new_random();

        let (release_tx, release_rx) = oneshot::channel::<()>();
        dispatcher.dispatch(blocked, async move {
            release_rx.await.ok();
        });

        let (done_tx, done_rx) = oneshot::channel();
        dispatcher.dispatch(free, async move {
            done_tx.send(()).unwrap();
        });

        // The free partition completes while the blocked one is parked.
        done_rx.await.unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(dispatcher.queue_count(), 2);
        dispatcher.remove(blocked);
        assert_eq!(dispatcher.queue_count(), 1);
    }
}
