use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{DeliveryConfig, SftpConfig};
use crate::error::{AutosegError, Result};
use crate::scheduler::descriptor::{
    KEY_CLIENT_DESTINATION, KEY_CLIENT_HOSTNAME, KEY_CLIENT_USERNAME,
};
use crate::scheduler::JobRecord;

/// Ships a processed job's results back to the client.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(&self, job: &JobRecord) -> Result<()>;
}

pub fn from_config(config: &DeliveryConfig) -> Arc<dyn Delivery> {
    match config {
        DeliveryConfig::Local => Arc::new(LocalDelivery),
        DeliveryConfig::Sftp(sftp) => Arc::new(SftpDelivery::new(sftp.clone())),
    }
}

/// Leaves results in the job directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDelivery;

#[async_trait]
impl Delivery for LocalDelivery {
    async fn send(&self, job: &JobRecord) -> Result<()> {
        tracing::debug!(job = %job.id(), "Results kept locally");
        Ok(())
    }
}

/// Pushes every file in the output directory to the client host with an
/// sftp batch read from stdin.
#[derive(Debug, Clone)]
pub struct SftpDelivery {
    config: SftpConfig,
}

/// Where a job's results go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub user: Option<String>,
    pub host: String,
    pub path: String,
}

impl Destination {
    pub fn from_job(job: &JobRecord) -> Result<Self> {
        let metadata = job.metadata();
        let host = metadata.get(KEY_CLIENT_HOSTNAME).ok_or_else(|| {
            AutosegError::DeliveryFailed(format!("{} has no {}", job.id(), KEY_CLIENT_HOSTNAME))
        })?;
        let path = metadata.get(KEY_CLIENT_DESTINATION).ok_or_else(|| {
            AutosegError::DeliveryFailed(format!(
                "{} has no {}",
                job.id(),
                KEY_CLIENT_DESTINATION
            ))
        })?;
        Ok(Self {
            user: metadata.get(KEY_CLIENT_USERNAME).map(str::to_string),
            host: host.to_string(),
            path: convert_vms_path(path),
        })
    }

    /// `user@host:path` remote target for sftp.
    pub fn remote(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, self.host, self.path),
            None => format!("{}:{}", self.host, self.path),
        }
    }
}

impl SftpDelivery {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// One `put` line per output file.
    pub fn batch(files: &[PathBuf]) -> String {
        files
            .iter()
            .map(|f| format!("put \"{}\"\n", f.display()))
            .collect()
    }

    fn output_files(job: &JobRecord) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(job.output_dir())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Delivery for SftpDelivery {
    async fn send(&self, job: &JobRecord) -> Result<()> {
        let destination = Destination::from_job(job)?;
        let files = Self::output_files(job)?;
        if files.is_empty() {
            return Err(AutosegError::DeliveryFailed(format!(
                "{} produced no output",
                job.id()
            )));
        }

        tracing::info!(
            job = %job.id(),
            remote = %destination.remote(),
            files = files.len(),
            "Delivering results"
        );

        let mut child = Command::new(&self.config.program)
            .arg("-q")
            .arg("-b")
            .arg("-")
            .arg(destination.remote())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AutosegError::DeliveryFailed(format!("cannot start sftp: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(Self::batch(&files).as_bytes()).await?;
        }

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AutosegError::DeliveryFailed(format!(
                    "sftp timed out after {:?}",
                    self.config.timeout
                ))
            })??;

        if output.status.success() {
            tracing::info!(job = %job.id(), "Results delivered");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(AutosegError::DeliveryFailed(if stderr.is_empty() {
                format!("sftp exit code: {:?}", output.status.code())
            } else {
                stderr
            }))
        }
    }
}

/// Convert an OpenVMS directory spec such as `DISK2:[USER.DATA]` to the
/// slash form the sftp server expects. Other paths pass through unchanged.
pub fn convert_vms_path(path: &str) -> String {
    if !path.contains('[') && !path.contains(']') {
        return path.to_string();
    }
    let converted = path
        .replace(':', "")
        .replace('.', "/")
        .replace('[', "/")
        .replace(']', "/");
    format!("/{}", converted.trim_start_matches('/'))
}
