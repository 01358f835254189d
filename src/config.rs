use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Job type key that selects the fallback processor.
pub const ANY_JOB_TYPE: &str = "*";

/// External program run for one job type.
///
/// Arguments may contain placeholders that are filled in per job:
/// `{job_dir}`, `{artifact}`, `{artifact_name}`, `{output_dir}`, `{name}`,
/// `{job_type}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Job type this program handles, or `*` for jobs with no other match
    pub job_type: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Kill the program if it runs longer than this
    pub timeout: Option<Duration>,
}

impl ProcessorConfig {
    pub fn new(job_type: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            job_type: job_type.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.job_type == ANY_JOB_TYPE
    }
}

/// Parses `TYPE=PROGRAM [ARGS...]`, arguments split on whitespace.
impl FromStr for ProcessorConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (job_type, command) = s
            .split_once('=')
            .ok_or_else(|| format!("expected TYPE=COMMAND, got {:?}", s))?;
        let job_type = job_type.trim();
        if job_type.is_empty() {
            return Err("job type must not be empty".to_string());
        }
        let mut words = command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| format!("no program given for job type {}", job_type))?;
        Ok(Self {
            job_type: job_type.to_string(),
            program: PathBuf::from(program),
            args: words.map(str::to_string).collect(),
            timeout: None,
        })
    }
}

/// How results are shipped back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeliveryConfig {
    /// Leave results in place; delivery always succeeds
    #[default]
    Local,
    /// Push the output directory with an sftp batch
    Sftp(SftpConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpConfig {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("sftp"),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Control-plane listener settings.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub listen_addr: SocketAddr,
    /// How long a connection may take to deliver its request
    pub request_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 4001)),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Working root holding the stage directories
    pub root: PathBuf,
    pub control: ControlConfig,
    pub ingest_interval: Duration,
    pub dispatch_interval: Duration,
    /// How often the retention pass runs over terminal stages
    pub cleanup_interval: Duration,
    /// How long terminal jobs are kept after completion
    pub retention: Duration,
    pub processors: Vec<ProcessorConfig>,
    pub delivery: DeliveryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            control: ControlConfig::default(),
            ingest_interval: Duration::from_secs(1),
            dispatch_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(3600),
            retention: Duration::from_secs(7 * 24 * 3600),
            processors: Vec::new(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_processor(mut self, processor: ProcessorConfig) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.control.listen_addr = addr;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.ingest_interval = interval;
        self.dispatch_interval = interval;
        self
    }
}
