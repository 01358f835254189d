use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AutosegError, Result};
use crate::scheduler::descriptor::{
    Dialect, Metadata, KEY_CLIENT_HOSTNAME, KEY_CLIENT_USERNAME, KEY_DATE_FINISHED, KEY_FILE_TYPE,
    KEY_JOB_NAME, KEY_JOB_TYPE, KEY_TARGET_FILE,
};

/// Subdirectory of every job directory that receives processing output.
pub const OUTPUT_DIR: &str = "masks";

/// Lifecycle stage of a job.
///
/// The stage is owned by whichever stage directory currently holds the job
/// directory. `InFlight` and `AwaitingDelivery` share one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Queued,
    InFlight,
    AwaitingDelivery,
    Done,
    Failed,
    Deleted,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Received => write!(f, "received"),
            Stage::Queued => write!(f, "queued"),
            Stage::InFlight => write!(f, "in_flight"),
            Stage::AwaitingDelivery => write!(f, "awaiting_delivery"),
            Stage::Done => write!(f, "done"),
            Stage::Failed => write!(f, "failed"),
            Stage::Deleted => write!(f, "deleted"),
        }
    }
}

impl Stage {
    /// Stages whose directories hold bound job directories. Job names are
    /// unique across all of them.
    pub const JOB_STAGES: [Stage; 5] = [
        Stage::Queued,
        Stage::InFlight,
        Stage::Done,
        Stage::Failed,
        Stage::Deleted,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Received => "inbox",
            Stage::Queued => "queued",
            Stage::InFlight | Stage::AwaitingDelivery => "in-flight",
            Stage::Done => "done",
            Stage::Failed => "failed",
            Stage::Deleted => "deleted",
        }
    }

    /// Terminal stages start the retention clock.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed | Stage::Deleted)
    }

    pub fn can_transition_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Received, Queued)
                | (Received, Failed)
                | (Queued, InFlight)
                | (Queued, Deleted)
                | (Queued, Failed)
                | (InFlight, AwaitingDelivery)
                | (InFlight, Failed)
                | (InFlight, Queued)
                | (AwaitingDelivery, Done)
                | (AwaitingDelivery, Failed)
                | (Done, Queued)
                | (Failed, Queued)
        )
    }
}

/// Compact view of a job used in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub job_type: Option<String>,
}

/// Full view of a job returned by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub stage: Stage,
    pub descriptor: String,
    pub artifact: Option<String>,
    pub job_type: Option<String>,
    pub file_type: Option<String>,
    pub client: Option<String>,
    pub metadata: Metadata,
}

/// A descriptor file loaded without any validation of its contents.
///
/// Retention and quarantine work on these so that descriptors missing
/// required keys can still be stamped and expired.
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    pub path: PathBuf,
    pub dialect: Dialect,
    pub metadata: Metadata,
}

impl DescriptorFile {
    /// Open the first descriptor found in a job directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = find_descriptor(dir)?
            .ok_or_else(|| AutosegError::DescriptorNotFound(dir.to_path_buf()))?;
        Self::read(&path)
    }

    /// Read a descriptor file directly.
    pub fn read(path: &Path) -> Result<Self> {
        let dialect = Dialect::from_path(path)
            .ok_or_else(|| AutosegError::DescriptorNotFound(path.to_path_buf()))?;
        let unparseable = |reason: String| AutosegError::Unparseable {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|e| unparseable(e.to_string()))?;
        let metadata = dialect.parse(&text).map_err(|e| match e {
            AutosegError::Json(e) => unparseable(e.to_string()),
            other => other,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            dialect,
            metadata,
        })
    }

    pub fn save(&self) -> Result<()> {
        let text = self.dialect.serialize(&self.metadata)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.get(KEY_DATE_FINISHED).and_then(parse_timestamp)
    }

    pub fn stamp_completed(&mut self, at: DateTime<Utc>) {
        self.metadata.insert(KEY_DATE_FINISHED, at.to_rfc3339());
    }

    pub fn clear_completed(&mut self) {
        self.metadata.remove(KEY_DATE_FINISHED);
    }
}

/// A job directory loaded from disk.
///
/// Records are cheap to rebuild and carry no identity beyond the directory
/// they were loaded from.
#[derive(Debug, Clone)]
pub struct JobRecord {
    dir: PathBuf,
    id: String,
    descriptor: DescriptorFile,
    artifact_path: Option<PathBuf>,
}

impl JobRecord {
    /// Load the descriptor of a job directory.
    ///
    /// The artifact is looked up but a missing artifact is not an error here;
    /// see [`JobRecord::resolve_artifact`].
    pub fn load(dir: &Path) -> Result<Self> {
        let descriptor = DescriptorFile::open(dir)?;
        let target = descriptor
            .metadata
            .get(KEY_TARGET_FILE)
            .ok_or_else(|| AutosegError::Malformed {
                path: descriptor.path.clone(),
                key: KEY_TARGET_FILE,
            })?;
        let artifact_path = find_file_ignore_case(dir, target)?;

        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            dir: dir.to_path_buf(),
            id,
            descriptor,
            artifact_path,
        })
    }

    /// Re-check the artifact on disk and return its path.
    pub fn resolve_artifact(&mut self) -> Result<&Path> {
        let target = self.target_file().unwrap_or_default().to_string();
        self.artifact_path = find_file_ignore_case(&self.dir, &target)?;
        self.artifact_path
            .as_deref()
            .ok_or_else(|| AutosegError::ArtifactNotFound {
                descriptor: self.descriptor.path.clone(),
                artifact: target,
            })
    }

    /// A record is resolved once both its descriptor and artifact exist.
    pub fn is_resolved(&self) -> bool {
        self.artifact_path.is_some()
    }

    /// Write the metadata back to the descriptor in its own dialect.
    pub fn save(&self) -> Result<()> {
        self.descriptor.save()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.descriptor.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.descriptor.metadata
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join(OUTPUT_DIR)
    }

    /// Declared job name, falling back to the directory name.
    pub fn name(&self) -> &str {
        self.metadata().get(KEY_JOB_NAME).unwrap_or(&self.id)
    }

    pub fn job_type(&self) -> Option<&str> {
        self.metadata().get(KEY_JOB_TYPE)
    }

    pub fn target_file(&self) -> Option<&str> {
        self.metadata().get(KEY_TARGET_FILE)
    }

    /// Case-insensitive match against the directory name or declared name.
    pub fn matches(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name) || self.name().eq_ignore_ascii_case(name)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.descriptor.completed_at()
    }

    pub fn stamp_completed(&mut self, at: DateTime<Utc>) {
        self.descriptor.stamp_completed(at);
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            name: self.name().to_string(),
            job_type: self.job_type().map(str::to_string),
        }
    }

    pub fn info(&self, stage: Stage) -> JobInfo {
        let metadata = self.metadata();
        let client = match (
            metadata.get(KEY_CLIENT_USERNAME),
            metadata.get(KEY_CLIENT_HOSTNAME),
        ) {
            (Some(user), Some(host)) => Some(format!("{}@{}", user, host)),
            (None, Some(host)) => Some(host.to_string()),
            _ => None,
        };
        JobInfo {
            id: self.id.clone(),
            name: self.name().to_string(),
            stage,
            descriptor: file_name_of(&self.descriptor.path),
            artifact: self.artifact_path.as_deref().map(file_name_of),
            job_type: self.job_type().map(str::to_string),
            file_type: metadata.get(KEY_FILE_TYPE).map(str::to_string),
            client,
            metadata: metadata.clone(),
        }
    }
}

/// Parse a completion stamp. RFC 3339 is written; bare `YYYY-MM-DD` dates
/// are still accepted and read as midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// First descriptor file in `dir`, in name order.
pub(crate) fn find_descriptor(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .find(|p| p.is_file() && crate::scheduler::descriptor::is_descriptor(p)))
}

pub(crate) fn find_file_ignore_case(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    if name.is_empty() {
        return Ok(None);
    }
    Ok(sorted_entries(dir)?.into_iter().find(|p| {
        p.is_file()
            && p.file_name()
                .map(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
                .unwrap_or(false)
    }))
}

pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
