use std::sync::Arc;

use tokio::sync::Mutex;

use crate::scheduler::{JobQueue, JobRef, JobStore, SharedQueue};

/// Store and queue shared between the loops and the control service.
#[derive(Clone)]
pub struct SharedState {
    pub store: JobStore,
    pub queue: SharedQueue,
    checkpoint: Arc<Mutex<()>>,
}

impl SharedState {
    pub fn new(store: JobStore, queue: JobQueue) -> Self {
        Self {
            store,
            queue: queue.shared(),
            checkpoint: Arc::new(Mutex::new(())),
        }
    }

    pub async fn enqueue(&self, job: JobRef) {
        self.queue.lock().await.enqueue(job);
        self.persist_queue_order().await;
    }

    /// Write the current dispatch order to the checkpoint file.
    ///
    /// Writers serialize on the checkpoint lock so an older snapshot never
    /// lands after a newer one. Failures are logged; the checkpoint only
    /// affects ordering after a restart.
    pub async fn persist_queue_order(&self) {
        let _guard = self.checkpoint.lock().await;
        let ids = self.queue.lock().await.ids();
        if let Err(e) = self.store.save_queue_order(&ids) {
            tracing::warn!(error = %e, "Failed to checkpoint queue order");
        }
    }
}
