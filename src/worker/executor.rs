use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{ProcessorConfig, ANY_JOB_TYPE};
use crate::error::{AutosegError, Result};
use crate::scheduler::JobRecord;

/// Runs the processing step for one job.
///
/// Implementations write their results into the job's output directory and
/// report success or failure. They must not move the job directory.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn run(&self, job: &JobRecord) -> Result<()>;
}

/// Result of running an external program
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Processor that runs an external program with per-job arguments.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    config: ProcessorConfig,
}

impl CommandProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Expand the argument template for one job.
    pub fn args_for(&self, job: &JobRecord) -> Vec<String> {
        let artifact = job
            .artifact_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let artifact_name = job
            .artifact_path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let vars = [
            ("{job_dir}", job.dir().display().to_string()),
            ("{artifact}", artifact),
            ("{artifact_name}", artifact_name),
            ("{output_dir}", job.output_dir().display().to_string()),
            ("{name}", job.name().to_string()),
            ("{job_type}", job.job_type().unwrap_or_default().to_string()),
        ];
        self.config
            .args
            .iter()
            .map(|arg| {
                vars.iter()
                    .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
            })
            .collect()
    }

    /// Run the program for one job and capture its output
    pub async fn execute(&self, job: &JobRecord) -> ExecutionResult {
        let args = self.args_for(job);
        tracing::info!(
            job = %job.id(),
            program = %self.config.program.display(),
            ?args,
            "Executing job"
        );

        let child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(job.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("processor timed out after {:?}", limit),
                )),
            },
            None => child.await,
        };

        Self::process_output(job.id(), result)
    }

    fn process_output(
        job_id: &str,
        result: std::result::Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                let error = if output.status.success() {
                    None
                } else if stderr.trim().is_empty() {
                    Some(format!("Exit code: {:?}", exit_code))
                } else {
                    Some(stderr.trim().to_string())
                };

                tracing::info!(
                    job = %job_id,
                    success = error.is_none(),
                    exit_code = ?exit_code,
                    "Processor finished"
                );

                ExecutionResult {
                    exit_code,
                    output: if stdout.is_empty() { None } else { Some(stdout) },
                    error,
                }
            }
            Err(e) => {
                tracing::error!(job = %job_id, error = %e, "Processor could not run");
                ExecutionResult {
                    exit_code: None,
                    output: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn run(&self, job: &JobRecord) -> Result<()> {
        let result = self.execute(job).await;
        match result.error {
            None => Ok(()),
            Some(error) => Err(AutosegError::ProcessFailed(error)),
        }
    }
}

/// Maps job types to processors.
///
/// Lookups are case-insensitive. A fallback processor, if set, handles jobs
/// whose type has no entry or that declare no type at all.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
    fallback: Option<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of [`CommandProcessor`]s. A `*` job type becomes the
    /// fallback.
    pub fn from_configs(configs: &[ProcessorConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            let processor = Arc::new(CommandProcessor::new(config.clone()));
            if config.is_fallback() {
                registry.set_fallback(processor);
            } else {
                registry.register(config.job_type.clone(), processor);
            }
        }
        registry
    }

    pub fn register(&mut self, job_type: impl Into<String>, processor: Arc<dyn Processor>) {
        let job_type = job_type.into().to_lowercase();
        if job_type == ANY_JOB_TYPE {
            self.fallback = Some(processor);
        } else {
            self.processors.insert(job_type, processor);
        }
    }

    pub fn set_fallback(&mut self, processor: Arc<dyn Processor>) {
        self.fallback = Some(processor);
    }

    pub fn resolve(&self, job_type: Option<&str>) -> Option<Arc<dyn Processor>> {
        job_type
            .and_then(|t| self.processors.get(&t.to_lowercase()))
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty() && self.fallback.is_none()
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("job_types", &self.job_types())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
