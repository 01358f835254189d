//! Directory-backed job repository.
//!
//! Every lifecycle stage is a fixed-name directory under the working root.
//! A job's stage is whichever directory currently holds its job directory,
//! and a transition is a rename between them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AutosegError, Result};
use crate::scheduler::descriptor::{self, KEY_JOB_NAME, KEY_JOB_TYPE, KEY_TARGET_FILE};
use crate::scheduler::job::{
    find_file_ignore_case, sorted_entries, DescriptorFile, JobRecord, JobSummary, Stage,
    OUTPUT_DIR,
};
use crate::scheduler::queue::{JobQueue, JobRef};

pub const SCRATCH_DIR: &str = "tmp";
pub const STATE_DIR: &str = "state";
const QUEUE_CHECKPOINT: &str = "queue.json";

const ALL_STAGES: [Stage; 6] = [
    Stage::Received,
    Stage::Queued,
    Stage::InFlight,
    Stage::Done,
    Stage::Failed,
    Stage::Deleted,
];

/// Outcome of one retention pass over a stage directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireReport {
    pub stamped: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    pub fn inbox(&self) -> PathBuf {
        self.stage_dir(Stage::Received)
    }

    /// Create any missing stage, scratch and state directory.
    pub fn ensure_stage_directories(&self) -> Result<()> {
        let dirs = ALL_STAGES
            .iter()
            .map(|s| self.stage_dir(*s))
            .chain([self.root.join(SCRATCH_DIR), self.root.join(STATE_DIR)]);
        for dir in dirs {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(&dir).map_err(|e| {
                AutosegError::Fatal(format!("cannot create {}: {}", dir.display(), e))
            })?;
            tracing::debug!(dir = %dir.display(), "Created stage directory");
        }
        Ok(())
    }

    /// Raw descriptor files waiting in the inbox, in name order.
    pub fn inbox_descriptors(&self) -> Result<Vec<PathBuf>> {
        Ok(sorted_entries(&self.inbox())?
            .into_iter()
            .filter(|p| p.is_file() && descriptor::is_descriptor(p))
            .collect())
    }

    /// Assemble a raw descriptor and its co-located artifact into a job
    /// directory inside the inbox.
    ///
    /// On an association error nothing is moved and the raw descriptor is
    /// left where it is.
    pub fn bind(&self, raw_descriptor: &Path) -> Result<PathBuf> {
        let descriptor = DescriptorFile::read(raw_descriptor)?;
        let target = descriptor
            .metadata
            .get(KEY_TARGET_FILE)
            .ok_or_else(|| AutosegError::Malformed {
                path: raw_descriptor.to_path_buf(),
                key: KEY_TARGET_FILE,
            })?;
        let parent = raw_descriptor.parent().unwrap_or(self.root.as_path());
        let artifact = find_file_ignore_case(parent, target)?.ok_or_else(|| {
            AutosegError::ArtifactNotFound {
                descriptor: raw_descriptor.to_path_buf(),
                artifact: target.to_string(),
            }
        })?;

        let name = self.unique_job_name(&candidate_name(raw_descriptor, &descriptor))?;
        let job_dir = parent.join(&name);
        fs::create_dir(&job_dir)?;
        if let Err(e) = assemble(&job_dir, raw_descriptor, &artifact) {
            tracing::warn!(job = %name, error = %e, "Binding failed, rolling back");
            rollback(&job_dir, parent);
            return Err(e.into());
        }
        tracing::debug!(job = %name, artifact = %artifact.display(), "Job bound");
        Ok(job_dir)
    }

    /// Move a raw descriptor that could not be bound into its own directory
    /// in the failed stage. Its artifact, if any, stays in the inbox.
    pub fn quarantine(&self, raw_descriptor: &Path) -> Result<PathBuf> {
        let name = match DescriptorFile::read(raw_descriptor) {
            Ok(descriptor) => candidate_name(raw_descriptor, &descriptor),
            Err(_) => file_stem(raw_descriptor),
        };
        let name = self.unique_job_name(&name)?;
        let job_dir = self.stage_dir(Stage::Failed).join(&name);
        fs::create_dir(&job_dir)?;
        let file_name = raw_descriptor
            .file_name()
            .ok_or_else(|| AutosegError::DescriptorNotFound(raw_descriptor.to_path_buf()))?;
        fs::rename(raw_descriptor, job_dir.join(file_name))?;
        self.update_completion(&job_dir, Stage::Received, Stage::Failed);
        Ok(job_dir)
    }

    /// Move a job directory between stages.
    ///
    /// If the destination already holds a directory of the same name, the
    /// source is renamed with a timestamp suffix and the move is retried once.
    pub fn move_job(&self, job_dir: &Path, from: Stage, to: Stage) -> Result<PathBuf> {
        if !from.can_transition_to(to) {
            return Err(AutosegError::InvalidTransition { from, to });
        }
        if from.dir_name() == to.dir_name() {
            return Ok(job_dir.to_path_buf());
        }
        if !job_dir.is_dir() {
            return Err(AutosegError::JobNotFound(job_dir.display().to_string()));
        }

        let dest_dir = self.stage_dir(to);
        let id = file_name(job_dir);
        let target = dest_dir.join(&id);
        if !target.exists() && fs::rename(job_dir, &target).is_ok() {
            self.update_completion(&target, from, to);
            tracing::debug!(job = %id, %from, %to, "Job moved");
            return Ok(target);
        }

        let renamed_id = format!("{}-{}", id, Utc::now().format("%Y%m%d%H%M%S%3f"));
        let renamed = job_dir.with_file_name(&renamed_id);
        let target = dest_dir.join(&renamed_id);
        let collision = |source: std::io::Error| AutosegError::MoveCollision {
            from: job_dir.to_path_buf(),
            to: target.clone(),
            source,
        };
        fs::rename(job_dir, &renamed).map_err(collision)?;
        if target.exists() {
            if let Err(back) = fs::rename(&renamed, job_dir) {
                tracing::error!(dir = %renamed.display(), error = %back, "Cannot restore job name");
            }
            return Err(collision(std::io::Error::from(
                std::io::ErrorKind::AlreadyExists,
            )));
        }
        if let Err(e) = fs::rename(&renamed, &target) {
            if let Err(back) = fs::rename(&renamed, job_dir) {
                tracing::error!(dir = %renamed.display(), error = %back, "Cannot restore job name");
            }
            return Err(collision(e));
        }
        self.update_completion(&target, from, to);
        tracing::warn!(job = %id, renamed = %renamed_id, %to, "Name collision, job renamed");
        Ok(target)
    }

    /// Retention pass over one stage directory.
    ///
    /// Jobs without a completion stamp are stamped now; stamped jobs older
    /// than `retention` are deleted. A descriptor that never parsed is aged
    /// by its directory's modification time.
    pub fn expire(&self, stage: Stage, retention: Duration) -> Result<ExpireReport> {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let now = Utc::now();
        let mut report = ExpireReport::default();

        for dir in self.job_dirs(stage)? {
            let finished = match DescriptorFile::open(&dir) {
                Ok(mut descriptor) => match descriptor.completed_at() {
                    Some(finished) => Some(finished),
                    None => {
                        descriptor.stamp_completed(now);
                        descriptor.save()?;
                        report.stamped += 1;
                        None
                    }
                },
                // A descriptor that never parsed cannot carry a stamp
                Err(AutosegError::Unparseable { .. }) => {
                    Some(DateTime::<Utc>::from(fs::metadata(&dir)?.modified()?))
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable job");
                    continue;
                }
            };
            match finished {
                None => {}
                Some(finished) if now - finished > retention => {
                    fs::remove_dir_all(&dir)?;
                    tracing::info!(dir = %dir.display(), %stage, "Expired job deleted");
                    report.deleted += 1;
                }
                Some(_) => {}
            }
        }
        Ok(report)
    }

    /// Load every job in a stage. Directories that do not load are skipped.
    pub fn list(&self, stage: Stage) -> Result<Vec<JobRecord>> {
        Ok(self
            .job_dirs(stage)?
            .into_iter()
            .filter_map(|dir| match JobRecord::load(&dir) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "Skipping job");
                    None
                }
            })
            .collect())
    }

    /// Summaries of every job directory in a stage, including quarantined
    /// descriptors that never bound to an artifact.
    pub fn summaries(&self, stage: Stage) -> Result<Vec<JobSummary>> {
        Ok(self
            .job_dirs(stage)?
            .into_iter()
            .map(|dir| match JobRecord::load(&dir) {
                Ok(record) => record.summary(),
                Err(_) => unbound_summary(&dir),
            })
            .collect())
    }

    /// Find a job in a stage by directory name or declared name.
    pub fn find(&self, stage: Stage, name: &str) -> Result<Option<JobRecord>> {
        Ok(self.list(stage)?.into_iter().find(|r| r.matches(name)))
    }

    pub fn save_queue_order(&self, ids: &[String]) -> Result<()> {
        let path = self.root.join(STATE_DIR).join(QUEUE_CHECKPOINT);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(ids)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn load_queue_order(&self) -> Result<Vec<String>> {
        let path = self.root.join(STATE_DIR).join(QUEUE_CHECKPOINT);
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Send every job left in the in-flight directory back to the queued
    /// stage if it still resolves, or to failed if it does not.
    ///
    /// Returns the ids that went back to queued.
    pub fn recover_in_flight(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();
        for dir in self.job_dirs(Stage::InFlight)? {
            let resolved = JobRecord::load(&dir)
                .and_then(|mut r| {
                    r.resolve_artifact()?;
                    Ok(())
                })
                .is_ok();
            if resolved {
                let moved = self.move_job(&dir, Stage::InFlight, Stage::Queued)?;
                tracing::warn!(job = %file_name(&moved), "Recovered interrupted job");
                recovered.push(file_name(&moved));
            } else {
                self.move_job(&dir, Stage::InFlight, Stage::Failed)?;
                tracing::error!(dir = %dir.display(), "Interrupted job no longer resolves");
            }
        }
        Ok(recovered)
    }

    /// Finish binds interrupted between assembly and the move to queued.
    fn recover_received(&self) -> Result<()> {
        for dir in self.job_dirs(Stage::Received)? {
            match JobRecord::load(&dir) {
                Ok(record) if record.is_resolved() => {
                    self.move_job(&dir, Stage::Received, Stage::Queued)?;
                }
                _ => {
                    self.move_job(&dir, Stage::Received, Stage::Failed)?;
                }
            }
        }
        Ok(())
    }

    /// Rebuild the queue from the queued stage directory.
    ///
    /// Interrupted jobs come first, then the checkpointed operator order,
    /// then any remaining directories in name order.
    pub fn rebuild_queue(&self) -> Result<JobQueue> {
        self.recover_received()?;
        let recovered = self.recover_in_flight()?;
        let checkpoint = self.load_queue_order()?;

        let mut records = Vec::new();
        for dir in self.job_dirs(Stage::Queued)? {
            match JobRecord::load(&dir) {
                Ok(record) if record.is_resolved() => records.push(record),
                Ok(_) | Err(_) => {
                    tracing::error!(dir = %dir.display(), "Queued job does not resolve");
                    self.move_job(&dir, Stage::Queued, Stage::Failed)?;
                }
            }
        }

        let rank = |id: &str| {
            recovered
                .iter()
                .position(|r| r == id)
                .map(|p| (0, p))
                .or_else(|| checkpoint.iter().position(|c| c == id).map(|p| (1, p)))
                .unwrap_or((2, 0))
        };
        records.sort_by(|a, b| {
            rank(a.id())
                .cmp(&rank(b.id()))
                .then_with(|| a.id().cmp(b.id()))
        });

        let queue = JobQueue::from_refs(records.iter().map(JobRef::from_record));
        tracing::info!(
            queued = queue.len(),
            recovered = recovered.len(),
            "Queue rebuilt"
        );
        Ok(queue)
    }

    fn job_dirs(&self, stage: Stage) -> Result<Vec<PathBuf>> {
        Ok(sorted_entries(&self.stage_dir(stage))?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect())
    }

    /// Candidate name, suffixed with `(n)` if any job directory already uses
    /// it (compared case-insensitively).
    fn unique_job_name(&self, candidate: &str) -> Result<String> {
        let mut taken = HashSet::new();
        for stage in Stage::JOB_STAGES.into_iter().chain([Stage::Received]) {
            for dir in self.job_dirs(stage)? {
                taken.insert(file_name(&dir).to_lowercase());
            }
        }
        if !taken.contains(&candidate.to_lowercase()) {
            return Ok(candidate.to_string());
        }
        let name = (1..)
            .map(|n| format!("{}({})", candidate, n))
            .find(|n| !taken.contains(&n.to_lowercase()))
            .unwrap_or_else(|| candidate.to_string());
        Ok(name)
    }

    /// Stamp completion on entry to a terminal stage; clear it on restart.
    fn update_completion(&self, job_dir: &Path, from: Stage, to: Stage) {
        let stamp = to.is_terminal();
        let clear = from.is_terminal() && to == Stage::Queued;
        if !stamp && !clear {
            return;
        }
        let result = DescriptorFile::open(job_dir).and_then(|mut d| {
            if stamp {
                d.stamp_completed(Utc::now());
            } else {
                d.clear_completed();
            }
            d.save()
        });
        if let Err(e) = result {
            tracing::debug!(dir = %job_dir.display(), error = %e, "Completion stamp not updated");
        }
    }
}

fn assemble(job_dir: &Path, descriptor: &Path, artifact: &Path) -> std::io::Result<()> {
    for file in [descriptor, artifact] {
        if let Some(name) = file.file_name() {
            fs::rename(file, job_dir.join(name))?;
        }
    }
    fs::create_dir(job_dir.join(OUTPUT_DIR))
}

fn rollback(job_dir: &Path, parent: &Path) {
    if let Ok(entries) = fs::read_dir(job_dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() {
                let _ = fs::rename(&path, parent.join(entry.file_name()));
            }
        }
    }
    let _ = fs::remove_dir_all(job_dir);
}

fn unbound_summary(dir: &Path) -> JobSummary {
    let id = file_name(dir);
    let metadata = DescriptorFile::open(dir).map(|d| d.metadata).unwrap_or_default();
    JobSummary {
        name: metadata.get(KEY_JOB_NAME).unwrap_or(&id).to_string(),
        job_type: metadata.get(KEY_JOB_TYPE).map(str::to_string),
        id,
    }
}

fn candidate_name(raw_descriptor: &Path, descriptor: &DescriptorFile) -> String {
    let name = descriptor
        .metadata
        .get(KEY_JOB_NAME)
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(raw_descriptor));
    sanitize(&name)
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, JobStore) {
        let tmp = TempDir::new().unwrap();
        let store = JobStore::new(tmp.path());
        store.ensure_stage_directories().unwrap();
        (tmp, store)
    }

    fn drop_in_inbox(store: &JobStore, name: &str, with_artifact: bool) -> PathBuf {
        let descriptor = store.inbox().join(format!("{}_EVAL.COM", name));
        fs::write(
            &descriptor,
            format!(
                "$ EVAL_FNAME :== {}\n$ TARGET_FILE :== {}.AIM\n$ JOB_TYPE :== radius_tibia_final\n",
                name, name
            ),
        )
        .unwrap();
        if with_artifact {
            fs::write(store.inbox().join(format!("{}.aim", name)), b"scan").unwrap();
        }
        descriptor
    }

    #[test]
    fn ensure_stage_directories_is_idempotent() {
        let (tmp, store) = store();
        store.ensure_stage_directories().unwrap();
        for dir in ["inbox", "queued", "in-flight", "done", "failed", "deleted", "tmp", "state"] {
            assert!(tmp.path().join(dir).is_dir(), "{} missing", dir);
        }
    }

    #[test]
    fn bind_assembles_job_directory() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0001", true);

        let job_dir = store.bind(&raw).unwrap();
        assert_eq!(job_dir, store.inbox().join("C0001"));
        assert!(job_dir.join("C0001_EVAL.COM").is_file());
        assert!(job_dir.join("C0001.aim").is_file());
        assert!(job_dir.join(OUTPUT_DIR).is_dir());
        assert!(!raw.exists());

        let record = JobRecord::load(&job_dir).unwrap();
        assert!(record.is_resolved());
    }

    #[test]
    fn bind_without_artifact_leaves_descriptor() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0002", false);

        let err = store.bind(&raw).unwrap_err();
        assert!(err.is_association_error());
        assert!(raw.is_file());
        assert!(!store.inbox().join("C0002").exists());
    }

    #[test]
    fn bind_suffixes_duplicate_names() {
        let (_tmp, store) = store();
        fs::create_dir(store.stage_dir(Stage::Done).join("C0003")).unwrap();
        fs::create_dir(store.stage_dir(Stage::Failed).join("C0003(1)")).unwrap();

        let raw = drop_in_inbox(&store, "C0003", true);
        let job_dir = store.bind(&raw).unwrap();
        assert_eq!(file_name(&job_dir), "C0003(2)");
    }

    #[test]
    fn move_job_rejects_invalid_transition() {
        let (_tmp, store) = store();
        let dir = store.stage_dir(Stage::Queued).join("x");
        fs::create_dir(&dir).unwrap();
        let err = store.move_job(&dir, Stage::Queued, Stage::Done).unwrap_err();
        assert!(matches!(err, AutosegError::InvalidTransition { .. }));
        assert!(dir.is_dir());
    }

    #[test]
    fn move_job_renames_on_collision() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0004", true);
        let job_dir = store.bind(&raw).unwrap();
        let queued = store.move_job(&job_dir, Stage::Received, Stage::Queued).unwrap();
        let in_flight = store.move_job(&queued, Stage::Queued, Stage::InFlight).unwrap();

        fs::create_dir(store.stage_dir(Stage::Done).join("C0004")).unwrap();
        let done = store
            .move_job(&in_flight, Stage::AwaitingDelivery, Stage::Done)
            .unwrap();
        let moved_name = file_name(&done);
        assert!(moved_name.starts_with("C0004-"), "{}", moved_name);
        assert!(done.is_dir());
        assert!(!in_flight.exists());
    }

    #[test]
    fn terminal_move_stamps_and_restart_clears() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0005", true);
        let dir = store.bind(&raw).unwrap();
        let dir = store.move_job(&dir, Stage::Received, Stage::Queued).unwrap();
        let dir = store.move_job(&dir, Stage::Queued, Stage::InFlight).unwrap();
        let dir = store.move_job(&dir, Stage::InFlight, Stage::Failed).unwrap();
        assert!(JobRecord::load(&dir).unwrap().completed_at().is_some());

        let dir = store.move_job(&dir, Stage::Failed, Stage::Queued).unwrap();
        assert!(JobRecord::load(&dir).unwrap().completed_at().is_none());
    }

    #[test]
    fn failed_move_leaves_no_stamp() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0007", true);
        let dir = store.bind(&raw).unwrap();
        let dir = store.move_job(&dir, Stage::Received, Stage::Queued).unwrap();
        let dir = store.move_job(&dir, Stage::Queued, Stage::InFlight).unwrap();
        fs::remove_dir(store.stage_dir(Stage::Failed)).unwrap();

        assert!(store.move_job(&dir, Stage::InFlight, Stage::Failed).is_err());
        assert!(dir.is_dir());
        assert!(JobRecord::load(&dir).unwrap().completed_at().is_none());
    }

    #[test]
    fn expire_ages_unparseable_descriptors_by_mtime() {
        let (_tmp, store) = store();
        let raw = store.inbox().join("BAD.json");
        fs::write(&raw, "{not json").unwrap();
        let dir = store.quarantine(&raw).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let kept = store
            .expire(Stage::Failed, Duration::from_secs(3600))
            .unwrap();
        assert_eq!(kept, ExpireReport::default());
        assert!(dir.is_dir());

        let report = store.expire(Stage::Failed, Duration::ZERO).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!dir.exists());
    }

    #[test]
    fn expire_stamps_then_deletes() {
        let (_tmp, store) = store();
        let fresh = store.stage_dir(Stage::Done).join("fresh");
        fs::create_dir(&fresh).unwrap();
        fs::write(fresh.join("fresh.com"), "$ TARGET_FILE :== fresh.aim\n").unwrap();

        let stale = store.stage_dir(Stage::Done).join("stale");
        fs::create_dir(&stale).unwrap();
        fs::write(
            stale.join("stale.com"),
            "$ TARGET_FILE :== stale.aim\n$ DATE_FINISHED :== 2020-01-01\n",
        )
        .unwrap();

        let report = store
            .expire(Stage::Done, Duration::from_secs(7 * 24 * 3600))
            .unwrap();
        assert_eq!(report, ExpireReport { stamped: 1, deleted: 1 });
        assert!(fresh.is_dir());
        assert!(!stale.exists());
        assert!(DescriptorFile::open(&fresh).unwrap().completed_at().is_some());
    }

    #[test]
    fn quarantine_wraps_descriptor_in_failed() {
        let (_tmp, store) = store();
        let raw = drop_in_inbox(&store, "C0006", false);
        let dir = store.quarantine(&raw).unwrap();
        assert_eq!(dir, store.stage_dir(Stage::Failed).join("C0006"));
        assert!(dir.join("C0006_EVAL.COM").is_file());
        assert!(!raw.exists());

        let failed = store.summaries(Stage::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "C0006");
        assert_eq!(failed[0].job_type.as_deref(), Some("radius_tibia_final"));
    }

    #[test]
    fn queue_order_checkpoint_round_trip() {
        let (_tmp, store) = store();
        assert!(store.load_queue_order().unwrap().is_empty());
        let ids = vec!["b".to_string(), "a".to_string()];
        store.save_queue_order(&ids).unwrap();
        assert_eq!(store.load_queue_order().unwrap(), ids);
    }

    #[test]
    fn sanitize_rejects_path_components() {
        assert_eq!(sanitize("../evil"), "_evil");
        assert_eq!(sanitize("a/b"), "a_b");
        assert_eq!(sanitize(".."), "job");
    }
}
