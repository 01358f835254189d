use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use autoseg::config::{DeliveryConfig, ProcessorConfig, ServerConfig, SftpConfig};
use autoseg::control::protocol::CommandName;
use autoseg::control::{ControlClient, ControlRequest, ControlResponse, Payload, ProcessingState};
use autoseg::scheduler::{JobInfo, JobListing, JobSummary};
use autoseg::shutdown::install_shutdown_handler;
use autoseg::{AutosegError, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "autoseg")]
#[command(version)]
#[command(about = "Directory-backed job queue for automated scan segmentation")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the server
    Server(ServerArgs),

    /// Queue and job management commands
    Queue {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: QueueCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Working root holding the stage directories
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Address for the control socket
    #[arg(long, default_value = "127.0.0.1:4001")]
    listen: SocketAddr,

    /// Processor for a job type, as "TYPE=PROGRAM ARGS..." ("*" matches any type).
    /// Example: "radius_tibia_final=python segment.py {job_dir} --image-pattern {artifact_name}"
    #[arg(long = "processor", value_name = "TYPE=COMMAND")]
    processors: Vec<ProcessorConfig>,

    /// Kill a processor after this many seconds
    #[arg(long)]
    processor_timeout_secs: Option<u64>,

    /// How results are returned to the client
    #[arg(long, default_value = "local")]
    delivery: DeliveryMode,

    /// sftp binary used for delivery
    #[arg(long, default_value = "sftp")]
    sftp_program: PathBuf,

    /// Poll interval for the ingestion and dispatch loops, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_ms: u64,

    /// Days to keep finished, failed and deleted jobs
    #[arg(long, default_value = "7")]
    retention_days: u64,
}

#[derive(Debug, Clone, ValueEnum)]
enum DeliveryMode {
    Local,
    Sftp,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server control address
    #[arg(long, short = 'a', default_value = "127.0.0.1:4001")]
    addr: String,

    /// Seconds to wait for a response
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Queue Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum QueueCommands {
    /// Show the job being processed and the waiting queue
    #[command(alias = "list")]
    Jobs,
    /// List finished jobs
    Completed,
    /// List failed jobs
    Failed,
    /// Show the metadata of one job
    Info {
        /// Job name or directory name
        name: String,
    },
    /// Move a queued job to a new position (1 is next)
    Move {
        name: String,
        position: usize,
    },
    /// Put a finished or failed job back on the queue
    Restart { name: String },
    /// Remove a queued job
    Delete { name: String },
    /// Stop dispatching new jobs
    Pause,
    /// Resume dispatching
    Unpause,
}

impl From<QueueCommands> for ControlRequest {
    fn from(cmd: QueueCommands) -> Self {
        match cmd {
            QueueCommands::Jobs => ControlRequest::Jobs,
            QueueCommands::Completed => ControlRequest::Completed,
            QueueCommands::Failed => ControlRequest::Failed,
            QueueCommands::Info { name } => ControlRequest::Info { name },
            QueueCommands::Move { name, position } => ControlRequest::Move { name, position },
            QueueCommands::Restart { name } => ControlRequest::Restart { name },
            QueueCommands::Delete { name } => ControlRequest::Delete { name },
            QueueCommands::Pause => ControlRequest::Pause,
            QueueCommands::Unpause => ControlRequest::Unpause,
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let processors: Vec<ProcessorConfig> = args
        .processors
        .into_iter()
        .map(|p| match args.processor_timeout_secs {
            Some(secs) => p.with_timeout(Duration::from_secs(secs)),
            None => p,
        })
        .collect();

    let delivery = match args.delivery {
        DeliveryMode::Local => DeliveryConfig::Local,
        DeliveryMode::Sftp => DeliveryConfig::Sftp(SftpConfig {
            program: args.sftp_program,
            ..SftpConfig::default()
        }),
    };

    let mut config = ServerConfig::new(args.root)
        .with_listen_addr(args.listen)
        .with_poll_interval(Duration::from_millis(args.poll_ms));
    config.processors = processors;
    config.delivery = delivery;
    config.retention = Duration::from_secs(args.retention_days * 24 * 3600);

    tracing::info!(
        root = %config.root.display(),
        listen_addr = %config.control.listen_addr,
        processors = ?config.processors.iter().map(|p| p.job_type.as_str()).collect::<Vec<_>>(),
        delivery = ?config.delivery,
        "Starting autoseg server"
    );

    let shutdown = install_shutdown_handler()?;
    let orchestrator = Orchestrator::from_config(config)?;
    orchestrator.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Output
// =============================================================================

fn print_listing(listing: &JobListing) {
    println!("Jobs in queue: (0 is being processed)");
    match &listing.current {
        Some(job) => println!("{:>3}: {}", 0, label(job)),
        None => println!("{:>3}: None", 0),
    }
    for (i, job) in listing.queued.iter().enumerate() {
        println!("{:>3}: {}", i + 1, label(job));
    }
}

fn print_jobs(title: &str, jobs: &[JobSummary]) {
    if jobs.is_empty() {
        println!("No {} jobs.", title);
        return;
    }
    println!("{:<30} {:<30} TYPE", "ID", "NAME");
    println!("{}", "-".repeat(78));
    for job in jobs {
        println!(
            "{:<30} {:<30} {}",
            job.id,
            job.name,
            job.job_type.as_deref().unwrap_or("-")
        );
    }
}

fn print_info(info: &JobInfo) {
    println!("Job:        {}", info.name);
    println!("Directory:  {}", info.id);
    println!("Stage:      {}", info.stage);
    println!("Descriptor: {}", info.descriptor);
    println!("Artifact:   {}", info.artifact.as_deref().unwrap_or("<missing>"));
    if let Some(job_type) = &info.job_type {
        println!("Type:       {}", job_type);
    }
    if let Some(client) = &info.client {
        println!("Client:     {}", client);
    }
    println!("Metadata:");
    for (key, value) in info.metadata.iter() {
        println!("  {} = {}", key, value);
    }
}

fn label(job: &JobSummary) -> String {
    if job.name == job.id {
        job.name.clone()
    } else {
        format!("{} ({})", job.name, job.id)
    }
}

fn print_response(response: &ControlResponse) {
    match &response.payload {
        Payload::Queue(listing) => print_listing(listing),
        Payload::Jobs(jobs) => {
            let title = if response.command == CommandName::Completed {
                "completed"
            } else {
                "failed"
            };
            print_jobs(title, jobs);
        }
        Payload::Info(info) => print_info(info),
        Payload::Processing(ProcessingState::Paused) => println!("Processing paused"),
        Payload::Processing(ProcessingState::Unpaused) => println!("Processing unpaused"),
        Payload::Error(err) => eprintln!("Error: {}", err),
    }
}

async fn handle_queue_command(
    client: &ClientArgs,
    command: QueueCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let control = ControlClient::new(&client.addr, Duration::from_secs(client.timeout_secs));
    let response = match control.request(&command.into()).await {
        Ok(response) => response,
        Err(AutosegError::NoResponse) => {
            eprintln!("No response from server at {}", client.addr);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table => print_response(&response),
    }
    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Queue { client, command } => {
            handle_queue_command(&client, command).await?;
        }
    }

    Ok(())
}
