use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::control::{ControlServer, ControlService};
use crate::error::Result;
use crate::scheduler::{JobRecord, JobRef, JobStore, Stage};
use crate::state::SharedState;
use crate::worker::delivery::{self, Delivery};
use crate::worker::ProcessorRegistry;

/// Result of one ingestion tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A descriptor was bound and its job queued under this id
    Queued(String),
    /// A descriptor could not be bound and was moved to failed
    Quarantined(String),
}

/// Result of one dispatch tick: the job and the stage it ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub id: String,
    pub stage: Stage,
}

/// Owns the job store and queue and drives the ingestion, dispatch and
/// control loops.
pub struct Orchestrator {
    pub config: ServerConfig,
    pub state: SharedState,
    pub processors: ProcessorRegistry,
    pub delivery: Arc<dyn Delivery>,
}

impl Orchestrator {
    /// Prepare the working root and rebuild the queue from disk.
    ///
    /// Fails if a stage directory cannot be created.
    pub fn new(
        config: ServerConfig,
        processors: ProcessorRegistry,
        delivery: Arc<dyn Delivery>,
    ) -> Result<Self> {
        let store = JobStore::new(&config.root);
        store.ensure_stage_directories()?;
        let queue = store.rebuild_queue()?;
        let state = SharedState::new(store, queue);
        Ok(Self {
            config,
            state,
            processors,
            delivery,
        })
    }

    /// Build processors and delivery from the configuration.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let processors = ProcessorRegistry::from_configs(&config.processors);
        if processors.is_empty() {
            tracing::warn!("No processors configured; every dispatched job will fail");
        }
        let delivery = delivery::from_config(&config.delivery);
        Self::new(config, processors, delivery)
    }

    pub fn store(&self) -> &JobStore {
        &self.state.store
    }

    pub fn control_service(&self) -> ControlService {
        ControlService::new(self.state.clone())
    }

    /// Bind the control socket. Failing to bind is fatal.
    pub async fn bind_control(&self) -> Result<ControlServer> {
        ControlServer::bind(
            self.config.control.listen_addr,
            self.control_service(),
            self.config.control.request_timeout,
        )
        .await
    }

    /// Bind the control socket and run all loops until `shutdown` is
    /// cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let server = self.bind_control().await?;
        self.serve(server, shutdown).await
    }

    /// Run the ingestion, dispatch and control loops on an already bound
    /// control server. After cancellation the dispatch loop finishes the job
    /// it is working on before returning.
    pub async fn serve(self, server: ControlServer, shutdown: CancellationToken) -> Result<()> {
        self.state.persist_queue_order().await;
        let this = Arc::new(self);

        let ingest = {
            let this = this.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { this.ingest_loop(shutdown).await })
        };
        let dispatch = {
            let this = this.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { this.dispatch_loop(shutdown).await })
        };
        let control = tokio::spawn(server.run(shutdown.clone()));

        for (name, handle) in [("ingest", ingest), ("dispatch", dispatch), ("control", control)] {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Task panicked");
            }
        }
        tracing::info!("Orchestrator stopped");
        Ok(())
    }

    async fn ingest_loop(&self, shutdown: CancellationToken) {
        let mut ingest_interval = tokio::time::interval(self.config.ingest_interval);
        let mut cleanup_interval = tokio::time::interval(self.config.cleanup_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ingest_interval.tick() => {
                    if let Err(e) = self.ingest_tick().await {
                        tracing::warn!(error = %e, "Ingestion tick failed");
                    }
                }
                _ = cleanup_interval.tick() => {
                    self.expire_tick();
                }
            }
        }
        tracing::debug!("Ingest loop stopped");
    }

    async fn dispatch_loop(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.dispatch_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // Not raced against shutdown: an in-flight job runs to completion.
                    self.dispatch_tick().await;
                }
            }
        }
        tracing::debug!("Dispatch loop stopped");
    }

    /// Bind at most one inbox descriptor and queue its job.
    ///
    /// Descriptors that fail association are quarantined into the failed
    /// stage. Descriptors that fail for other reasons are skipped this tick
    /// so they cannot block the rest of the inbox.
    pub async fn ingest_tick(&self) -> Result<Option<IngestOutcome>> {
        let store = &self.state.store;
        for raw in store.inbox_descriptors()? {
            match store.bind(&raw) {
                Ok(job_dir) => {
                    let queued = store.move_job(&job_dir, Stage::Received, Stage::Queued)?;
                    let record = JobRecord::load(&queued)?;
                    let job = JobRef::from_record(&record);
                    tracing::info!(job = %job.id, name = %job.name, "Job queued");
                    let id = job.id.clone();
                    self.state.enqueue(job).await;
                    return Ok(Some(IngestOutcome::Queued(id)));
                }
                Err(e) if e.is_association_error() => {
                    tracing::error!(descriptor = %raw.display(), error = %e, "Cannot bind descriptor");
                    let failed = store.quarantine(&raw)?;
                    let id = failed
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    return Ok(Some(IngestOutcome::Quarantined(id)));
                }
                Err(e) => {
                    tracing::warn!(descriptor = %raw.display(), error = %e, "Skipping descriptor");
                }
            }
        }
        Ok(None)
    }

    /// Retention pass over every terminal stage.
    pub fn expire_tick(&self) {
        for stage in [Stage::Done, Stage::Failed, Stage::Deleted] {
            match self.state.store.expire(stage, self.config.retention) {
                Ok(report) if report.deleted > 0 || report.stamped > 0 => {
                    tracing::info!(
                        %stage,
                        deleted = report.deleted,
                        stamped = report.stamped,
                        "Retention pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%stage, error = %e, "Retention pass failed"),
            }
        }
    }

    /// Take the head of the queue, unless paused, and run it through
    /// processing and delivery.
    pub async fn dispatch_tick(&self) -> Option<DispatchOutcome> {
        let job = self.state.queue.lock().await.next_dispatchable()?;
        self.state.persist_queue_order().await;

        let stage = self.dispatch(&job).await;
        self.state.queue.lock().await.clear_current();
        Some(DispatchOutcome { id: job.id, stage })
    }

    async fn dispatch(&self, job: &JobRef) -> Stage {
        let store = &self.state.store;
        let dir = match store.move_job(&job.path, Stage::Queued, Stage::InFlight) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Cannot start job");
                return self.abandon(job).await;
            }
        };
        self.state.queue.lock().await.set_current(JobRef {
            path: dir.clone(),
            ..job.clone()
        });

        let mut record = match JobRecord::load(&dir) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Job no longer loads");
                return self.fail(&dir, Stage::InFlight);
            }
        };
        if let Err(e) = record.resolve_artifact() {
            tracing::error!(job = %job.id, error = %e, "Job no longer resolves");
            return self.fail(&dir, Stage::InFlight);
        }

        let Some(processor) = self.processors.resolve(record.job_type()) else {
            tracing::error!(
                job = %job.id,
                job_type = record.job_type().unwrap_or("<none>"),
                "No processor for job type"
            );
            return self.fail(&dir, Stage::InFlight);
        };

        tracing::info!(job = %job.id, name = %job.name, "Processing job");
        if let Err(e) = processor.run(&record).await {
            tracing::error!(job = %job.id, error = %e, "Processing failed");
            return self.fail(&dir, Stage::InFlight);
        }

        let dir = match store.move_job(&dir, Stage::InFlight, Stage::AwaitingDelivery) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Cannot mark job for delivery");
                return self.fail(&dir, Stage::InFlight);
            }
        };
        let record = match JobRecord::load(&dir) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Job no longer loads");
                return self.fail(&dir, Stage::AwaitingDelivery);
            }
        };
        if let Err(e) = self.delivery.send(&record).await {
            tracing::error!(job = %job.id, error = %e, "Delivery failed");
            return self.fail(&dir, Stage::AwaitingDelivery);
        }

        match store.move_job(&dir, Stage::AwaitingDelivery, Stage::Done) {
            Ok(_) => {
                tracing::info!(job = %job.id, "Job done");
                Stage::Done
            }
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "Cannot move finished job");
                Stage::AwaitingDelivery
            }
        }
    }

    /// Settle a job that was taken off the queue but could not be started.
    /// It goes to failed; if that move fails too it goes back to the head of
    /// the queue so it stays visible to the operator.
    async fn abandon(&self, job: &JobRef) -> Stage {
        if !job.path.is_dir() {
            tracing::warn!(job = %job.id, "Job directory vanished from queued");
            return Stage::Deleted;
        }
        match self.fail(&job.path, Stage::Queued) {
            Stage::Failed => Stage::Failed,
            _ => {
                self.state.queue.lock().await.requeue_front(job.clone());
                self.state.persist_queue_order().await;
                Stage::Queued
            }
        }
    }

    /// Move a job to failed. If even that fails the job stays where it is and
    /// startup recovery picks it up.
    fn fail(&self, dir: &std::path::Path, from: Stage) -> Stage {
        match self.state.store.move_job(dir, from, Stage::Failed) {
            Ok(_) => Stage::Failed,
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "Cannot move job to failed");
                from
            }
        }
    }
}
