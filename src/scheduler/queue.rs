use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AutosegError, Result};
use crate::scheduler::job::{JobRecord, JobSummary};

/// Queue handle shared by the orchestrator loops.
pub type SharedQueue = Arc<Mutex<JobQueue>>;

/// Lightweight reference to a queued job directory.
///
/// Carries the declared name and job type so that lookups never touch the
/// filesystem while the queue lock is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub id: String,
    pub name: String,
    pub job_type: Option<String>,
    pub path: PathBuf,
}

impl JobRef {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            id: record.id().to_string(),
            name: record.name().to_string(),
            job_type: record.job_type().map(str::to_string),
            path: record.dir().to_path_buf(),
        }
    }

    /// Case-insensitive match against the declared name or directory name.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.id.eq_ignore_ascii_case(name)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            job_type: self.job_type.clone(),
        }
    }
}

/// Operator view of the queue: slot 0 is the job being processed, followed
/// by the waiting line in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub current: Option<JobSummary>,
    pub queued: Vec<JobSummary>,
}

/// Ordered waiting line plus the processing gate.
///
/// The queue is a projection of the `queued` stage directory: every entry
/// must have a directory there.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<JobRef>,
    current: Option<JobRef>,
    paused: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_refs(refs: impl IntoIterator<Item = JobRef>) -> Self {
        Self {
            jobs: refs.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedQueue {
        Arc::new(Mutex::new(self))
    }

    /// Append a job to the tail.
    pub fn enqueue(&mut self, job: JobRef) {
        tracing::debug!(job = %job.id, "Enqueued");
        self.jobs.push_back(job);
    }

    /// Put a job back at the head, ahead of everything waiting.
    pub fn requeue_front(&mut self, job: JobRef) {
        tracing::debug!(job = %job.id, "Requeued at head");
        self.jobs.push_front(job);
    }

    /// Remove and return the head.
    pub fn dequeue(&mut self) -> Option<JobRef> {
        let job = self.jobs.pop_front()?;
        tracing::debug!(job = %job.id, "Dequeued");
        Some(job)
    }

    /// Current contents in dispatch order, without removing anything.
    pub fn snapshot(&self) -> Vec<JobRef> {
        self.jobs.iter().cloned().collect()
    }

    /// Directory ids in dispatch order.
    pub fn ids(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.id.clone()).collect()
    }

    /// Move the first job matching `name` to a 1-based position in the
    /// waiting line. Position 0 is the in-flight slot and cannot be targeted.
    pub fn reposition(&mut self, name: &str, position: usize) -> Result<()> {
        let len = self.jobs.len();
        if position < 1 || position > len {
            return Err(AutosegError::OutOfRange { position, len });
        }
        let idx = self
            .jobs
            .iter()
            .position(|j| j.matches(name))
            .ok_or_else(|| AutosegError::JobNotFound(name.to_string()))?;
        if let Some(job) = self.jobs.remove(idx) {
            tracing::info!(job = %job.id, position, "Job repositioned");
            self.jobs.insert(position - 1, job);
        }
        Ok(())
    }

    /// Remove the first job matching `name`. The caller owns relocating its
    /// directory.
    pub fn remove(&mut self, name: &str) -> Result<JobRef> {
        let idx = self
            .jobs
            .iter()
            .position(|j| j.matches(name))
            .ok_or_else(|| AutosegError::JobNotFound(name.to_string()))?;
        self.jobs
            .remove(idx)
            .ok_or_else(|| AutosegError::JobNotFound(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&JobRef> {
        self.jobs.iter().find(|j| j.matches(name))
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.paused {
            return Err(AutosegError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.paused {
            return Err(AutosegError::AlreadyUnpaused);
        }
        self.paused = false;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Dequeue the head unless processing is paused.
    pub fn next_dispatchable(&mut self) -> Option<JobRef> {
        if self.paused {
            return None;
        }
        self.dequeue()
    }

    pub fn set_current(&mut self, job: JobRef) {
        self.current = Some(job);
    }

    pub fn clear_current(&mut self) -> Option<JobRef> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&JobRef> {
        self.current.as_ref()
    }

    pub fn listing(&self) -> JobListing {
        JobListing {
            current: self.current.as_ref().map(JobRef::summary),
            queued: self.jobs.iter().map(JobRef::summary).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobRef {
        JobRef {
            id: id.to_string(),
            name: id.to_uppercase(),
            job_type: None,
            path: PathBuf::from("queued").join(id),
        }
    }

    fn ids(queue: &JobQueue) -> Vec<String> {
        queue.ids()
    }

    #[test]
    fn fifo_order() {
        let mut q = JobQueue::new();
        q.enqueue(job("a"));
        q.enqueue(job("b"));
        assert_eq!(q.dequeue().unwrap().id, "a");
        assert_eq!(q.dequeue().unwrap().id, "b");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn requeue_front_goes_ahead_of_waiting_jobs() {
        let mut q = JobQueue::from_refs(vec![job("a"), job("b")]);
        let head = q.dequeue().unwrap();
        q.enqueue(job("c"));
        q.requeue_front(head);
        assert_eq!(ids(&q), vec!["a", "b", "c"]);
    }

    #[test]
    fn snapshot_does_not_drain() {
        let q = JobQueue::from_refs(vec![job("a"), job("b")]);
        assert_eq!(q.snapshot().len(), 2);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn reposition_bounds() {
        let mut q = JobQueue::from_refs(vec![job("a"), job("b"), job("c")]);
        assert!(matches!(
            q.reposition("a", 0),
            Err(AutosegError::OutOfRange { position: 0, len: 3 })
        ));
        assert!(matches!(
            q.reposition("a", 4),
            Err(AutosegError::OutOfRange { position: 4, len: 3 })
        ));
        assert_eq!(ids(&q), vec!["a", "b", "c"]);
    }

    #[test]
    fn reposition_moves_only_target() {
        let mut q = JobQueue::from_refs(vec![job("a"), job("b"), job("c"), job("d")]);
        q.reposition("D", 1).unwrap();
        assert_eq!(ids(&q), vec!["d", "a", "b", "c"]);
        q.reposition("d", 4).unwrap();
        assert_eq!(ids(&q), vec!["a", "b", "c", "d"]);
        q.reposition("b", 3).unwrap();
        assert_eq!(ids(&q), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn reposition_unknown_job() {
        let mut q = JobQueue::from_refs(vec![job("a")]);
        assert!(matches!(
            q.reposition("zzz", 1),
            Err(AutosegError::JobNotFound(_))
        ));
    }

    #[test]
    fn remove_by_declared_name() {
        let mut q = JobQueue::from_refs(vec![job("a"), job("b")]);
        let removed = q.remove("B").unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(ids(&q), vec!["a"]);
        assert!(q.remove("b").is_err());
    }

    #[test]
    fn pause_is_not_idempotent() {
        let mut q = JobQueue::new();
        q.pause().unwrap();
        assert!(matches!(q.pause(), Err(AutosegError::AlreadyPaused)));
        q.resume().unwrap();
        assert!(matches!(q.resume(), Err(AutosegError::AlreadyUnpaused)));
    }

    #[test]
    fn paused_queue_is_not_dispatchable() {
        let mut q = JobQueue::from_refs(vec![job("a")]);
        q.pause().unwrap();
        assert!(q.next_dispatchable().is_none());
        assert_eq!(q.len(), 1);
        q.resume().unwrap();
        assert_eq!(q.next_dispatchable().unwrap().id, "a");
    }

    #[test]
    fn listing_puts_current_in_slot_zero() {
        let mut q = JobQueue::from_refs(vec![job("b")]);
        assert!(q.listing().current.is_none());
        q.set_current(job("a"));
        let listing = q.listing();
        assert_eq!(listing.current.unwrap().id, "a");
        assert_eq!(listing.queued.len(), 1);
        q.clear_current();
        assert!(q.current().is_none());
    }
}
