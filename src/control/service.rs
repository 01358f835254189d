use crate::control::protocol::{
    CommandName, ControlError, ControlRequest, ControlResponse, Payload, ProcessingState,
};
use crate::error::{AutosegError, Result};
use crate::scheduler::{JobInfo, JobListing, JobRecord, JobRef, Stage};
use crate::state::SharedState;

/// Handles operator commands against the store and the queue.
#[derive(Clone)]
pub struct ControlService {
    state: SharedState,
}

impl ControlService {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let command = request.command();
        tracing::debug!(%command, "Control request");
        let result = match request {
            ControlRequest::Jobs => Ok(Payload::Queue(self.listing().await)),
            ControlRequest::Completed => self.stage_listing(Stage::Done),
            ControlRequest::Failed => self.stage_listing(Stage::Failed),
            ControlRequest::Info { name } => self.info(&name).await,
            ControlRequest::Move { name, position } => self.reposition(&name, position).await,
            ControlRequest::Restart { name } => self.restart(&name).await,
            ControlRequest::Delete { name } => self.delete(&name).await,
            ControlRequest::Pause => self.pause().await,
            ControlRequest::Unpause => self.unpause().await,
        };
        match result {
            Ok(payload) => ControlResponse::new(command, payload),
            Err(e) => {
                tracing::warn!(%command, error = %e, "Control request failed");
                ControlResponse::error(command, ControlError::from(&e))
            }
        }
    }

    async fn listing(&self) -> JobListing {
        self.state.queue.lock().await.listing()
    }

    fn stage_listing(&self, stage: Stage) -> Result<Payload> {
        Ok(Payload::Jobs(self.state.store.summaries(stage)?))
    }

    async fn info(&self, name: &str) -> Result<Payload> {
        let (current, queued) = {
            let queue = self.state.queue.lock().await;
            (
                queue.current().filter(|j| j.matches(name)).cloned(),
                queue.find(name).cloned(),
            )
        };
        let located = current
            .map(|j| (j, Stage::InFlight))
            .or_else(|| queued.map(|j| (j, Stage::Queued)));
        if let Some((job, stage)) = located {
            let record = JobRecord::load(&job.path)?;
            return Ok(info_payload(record.info(stage)));
        }
        for stage in [Stage::Done, Stage::Failed] {
            if let Some(record) = self.state.store.find(stage, name)? {
                return Ok(info_payload(record.info(stage)));
            }
        }
        Err(AutosegError::JobNotFound(name.to_string()))
    }

    async fn reposition(&self, name: &str, position: usize) -> Result<Payload> {
        let listing = {
            let mut queue = self.state.queue.lock().await;
            queue.reposition(name, position)?;
            queue.listing()
        };
        self.state.persist_queue_order().await;
        Ok(Payload::Queue(listing))
    }

    async fn restart(&self, name: &str) -> Result<Payload> {
        for stage in [Stage::Done, Stage::Failed] {
            if let Some(mut record) = self.state.store.find(stage, name)? {
                // Only resolved jobs may enter the queue
                record.resolve_artifact()?;
                let dir = self.state.store.move_job(record.dir(), stage, Stage::Queued)?;
                let record = JobRecord::load(&dir)?;
                tracing::info!(job = %record.id(), from = %stage, "Job restarted");
                self.state.enqueue(JobRef::from_record(&record)).await;
                return Ok(Payload::Queue(self.listing().await));
            }
        }
        Err(AutosegError::JobNotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<Payload> {
        let job = self.state.queue.lock().await.remove(name)?;
        self.state.persist_queue_order().await;
        self.state
            .store
            .move_job(&job.path, Stage::Queued, Stage::Deleted)?;
        tracing::info!(job = %job.id, "Job deleted");
        Ok(Payload::Queue(self.listing().await))
    }

    async fn pause(&self) -> Result<Payload> {
        self.state.queue.lock().await.pause()?;
        tracing::info!("Processing paused");
        Ok(Payload::Processing(ProcessingState::Paused))
    }

    async fn unpause(&self) -> Result<Payload> {
        self.state.queue.lock().await.resume()?;
        tracing::info!("Processing unpaused");
        Ok(Payload::Processing(ProcessingState::Unpaused))
    }

    /// Answer for a frame that did not decode to a request.
    pub fn reject(&self, err: &AutosegError) -> ControlResponse {
        tracing::warn!(error = %err, "Rejected control request");
        ControlResponse::error(CommandName::Invalid, ControlError::from(err))
    }
}

fn info_payload(info: JobInfo) -> Payload {
    Payload::Info(Box::new(info))
}
