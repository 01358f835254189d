//! Test harness for orchestrator and control-plane integration tests.
//!
//! Provides a throwaway working root, helpers to drop jobs into its inbox,
//! and processors and deliveries whose outcome the test controls.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{Mutex, Notify};

use autoseg::config::ServerConfig;
use autoseg::error::{AutosegError, Result};
use autoseg::scheduler::{JobRecord, Stage};
use autoseg::worker::{Delivery, LocalDelivery, Processor, ProcessorRegistry};
use autoseg::Orchestrator;

/// Temporary working root with a config tuned for fast tests
pub struct TestRoot {
    pub tmp: TempDir,
    pub config: ServerConfig,
}

impl TestRoot {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::new(tmp.path())
            .with_listen_addr("127.0.0.1:0".parse().unwrap())
            .with_poll_interval(Duration::from_millis(20));
        Self { tmp, config }
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.path().join(stage.dir_name())
    }

    /// Write a COM descriptor and its artifact into the inbox.
    pub fn drop_job(&self, name: &str, job_type: &str) {
        self.drop_descriptor(name, job_type);
        fs::write(self.inbox().join(format!("{}.AIM", name)), b"scan").unwrap();
    }

    /// Write a descriptor without its artifact.
    pub fn drop_descriptor(&self, name: &str, job_type: &str) {
        fs::create_dir_all(self.inbox()).unwrap();
        fs::write(
            self.inbox().join(format!("{}_EVAL.COM", name)),
            format!(
                "$ EVAL_FNAME :== {name}\n\
                 $ TARGET_FILE :== {name}.AIM\n\
                 $ JOB_TYPE :== {job_type}\n\
                 $ CLIENT_HOSTNAME :== vms01\n\
                 $ CLIENT_DESTINATION :== DK0:[RESULTS]\n"
            ),
        )
        .unwrap();
    }

    pub fn inbox(&self) -> PathBuf {
        self.stage_dir(Stage::Received)
    }

    pub fn job_dir(&self, stage: Stage, id: &str) -> PathBuf {
        self.stage_dir(stage).join(id)
    }

    pub fn orchestrator(&self, processors: ProcessorRegistry) -> Orchestrator {
        self.orchestrator_with(processors, Arc::new(LocalDelivery))
    }

    pub fn orchestrator_with(
        &self,
        processors: ProcessorRegistry,
        delivery: Arc<dyn Delivery>,
    ) -> Orchestrator {
        Orchestrator::new(self.config.clone(), processors, delivery).unwrap()
    }
}

/// Registry with one processor handling every job type
pub fn registry(processor: Arc<dyn Processor>) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.set_fallback(processor);
    registry
}

/// Processor that writes a mask into the output directory and records the
/// jobs it saw, in order.
#[derive(Default)]
pub struct RecordingProcessor {
    pub seen: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingProcessor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub async fn seen(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn run(&self, job: &JobRecord) -> Result<()> {
        self.seen.lock().await.push(job.id().to_string());
        if self.fail {
            return Err(AutosegError::ProcessFailed("segmentation crashed".into()));
        }
        fs::write(job.output_dir().join("mask.aim"), b"mask")?;
        Ok(())
    }
}

/// Processor that blocks until released.
#[derive(Default)]
pub struct GatedProcessor {
    pub started: Notify,
    pub release: Notify,
}

#[async_trait]
impl Processor for GatedProcessor {
    async fn run(&self, job: &JobRecord) -> Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        fs::write(job.output_dir().join("mask.aim"), b"mask")?;
        Ok(())
    }
}

/// Delivery that always fails
pub struct FailingDelivery;

#[async_trait]
impl Delivery for FailingDelivery {
    async fn send(&self, _job: &JobRecord) -> Result<()> {
        Err(AutosegError::DeliveryFailed("host unreachable".into()))
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(20)).await;
    assert!(result, "{}", message);
}
