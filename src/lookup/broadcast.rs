use crate::{config::Config, lookup::ServiceLookupTable, store::BroadcastSink};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time,
};

/// Periodic broadcast job.
///
/// On every tick, takes the delta accumulated since the previous tick
/// and ships it into the sink; ticks with no delta send nothing.
/// Stragglers catch up through explicit resolution, not through the
/// broadcast.
pub struct Broadcaster {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Broadcaster {
    pub fn spawn<S>(table: Arc<Mutex<ServiceLookupTable>>, sink: S, config: &Config) -> Self
    where
        S: BroadcastSink + 'static,
    {
        let (shutdown, mut stopped) = watch::channel(false);
        let interval = Duration::from_secs(config.broadcast_interval);

        let handle = tokio::spawn(async move {
            let mut timer = time::interval(interval);
            // The immediate first tick would broadcast before anything
            // accumulated.
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let body = table.lock().await.try_get_update_body();

                        if let Some(body) = body {
                            debug!(
                                "Broadcasting {} entries covering {}",
                                body.entries.len(),
                                body.covered_versions
                            );

                            sink.broadcast(body).await;
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }

            debug!("Broadcast job stopped");
        });

        Broadcaster { shutdown, handle }
    }

    /// Cancels the timer and waits for the job to wind down.
    pub async fn dispose(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
