use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use resq::config::{parse_queues, BackendConfig, LogLevel, WorkerConfig};
use resq::handler::JobRegistry;
use resq::worker::{child, process, ExecutorConfig, JobExecutor, Worker};
use resq::{queue, store};

#[derive(Parser, Debug)]
#[command(name = "resq")]
#[command(version)]
#[command(about = "Background job workers backed by Redis")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start one or more workers
    Work(WorkArgs),

    /// Push a job onto a queue
    Enqueue(EnqueueArgs),

    /// Run a single job handed over by a worker (internal)
    #[command(hide = true)]
    Perform(BackendArgs),
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    /// Store address: "host:port", "redis://...", "unix:/path" or a
    /// comma-separated list of "[alias=]host:port" for a cluster
    #[arg(long, env = "REDIS_BACKEND", default_value = "localhost:6379")]
    backend: String,

    /// Database number
    #[arg(long, env = "REDIS_DATABASE", default_value = "0")]
    database: i64,
}

impl BackendArgs {
    fn config(&self) -> resq::error::Result<BackendConfig> {
        BackendConfig::parse(&self.backend)
    }
}

#[derive(clap::Args, Debug)]
struct WorkArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Queues to poll in priority order (comma-separated, "*" for all)
    #[arg(long, env = "QUEUE")]
    queue: String,

    /// Log each job
    #[arg(long, env = "LOGGING", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    logging: bool,

    /// Same as --logging
    #[arg(long, env = "VERBOSE", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    verbose: bool,

    /// Log every poll
    #[arg(long, env = "VVERBOSE", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    vverbose: bool,

    /// Seconds to sleep when no job is found
    #[arg(long, env = "INTERVAL", default_value = "5")]
    interval: u64,

    /// Number of worker processes
    #[arg(long, env = "COUNT", default_value = "1")]
    count: usize,

    /// Write the worker's pid here (single worker only)
    #[arg(long, env = "PIDFILE")]
    pid_file: Option<PathBuf>,

    /// Kill jobs running longer than this many seconds
    #[arg(long, env = "JOB_TIMEOUT")]
    job_timeout: Option<u64>,
}

impl WorkArgs {
    fn config(&self) -> resq::error::Result<WorkerConfig> {
        Ok(WorkerConfig {
            queues: parse_queues(&self.queue),
            backend: self.backend.config()?,
            database: self.backend.database,
            log_level: LogLevel::from_flags(self.logging, self.verbose, self.vverbose),
            interval: Duration::from_secs(self.interval),
            count: self.count.max(1),
            pid_file: self.pid_file.clone(),
            job_timeout: self.job_timeout.map(Duration::from_secs),
        })
    }
}

#[derive(clap::Args, Debug)]
struct EnqueueArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Queue name
    queue: String,

    /// Job class
    class: String,

    /// Job arguments as a JSON array
    #[arg(long, default_value = "[]")]
    args: String,

    /// Track the job's status
    #[arg(long)]
    track: bool,
}

fn init_logging(default: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

// =============================================================================
// Workers
// =============================================================================

async fn run_work(args: WorkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config()?;
    init_logging(config.log_level.filter());

    if config.queues.is_empty() {
        return Err("Set QUEUE env var containing the list of queues to work.".into());
    }

    if config.count > 1 {
        return run_many(&config).await;
    }
    run_one(&config).await
}

async fn run_one(config: &WorkerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &config.pid_file {
        process::write_pid_file(path)?;
    }

    let store = store::connect(&config.backend, config.database).await?;
    let executor = JobExecutor::new(
        ExecutorConfig::current_exe()?
            .with_env("REDIS_BACKEND", config.backend.to_string())
            .with_env("REDIS_DATABASE", config.database.to_string())
            .with_log_filter(
                std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.filter().to_string()),
            ),
    );

    let mut worker = Worker::new(store, config.queues.clone(), executor)
        .with_job_timeout(config.job_timeout);
    tracing::info!(
        worker = %worker.id(),
        backend = %config.backend,
        interval = ?config.interval,
        "Starting worker"
    );
    let result = worker.work(config.interval).await;

    if let Some(path) = &config.pid_file {
        if let Err(e) = process::remove_pid_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove pid file");
        }
    }
    result?;
    Ok(())
}

/// Start `count` single-worker processes and wait for all of them.
async fn run_many(config: &WorkerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let exe = std::env::current_exe()?;
    let mut children = Vec::with_capacity(config.count);

    for _ in 0..config.count {
        let mut command = tokio::process::Command::new(&exe);
        command
            .arg("work")
            .env("QUEUE", config.queues.join(","))
            .env("REDIS_BACKEND", config.backend.to_string())
            .env("REDIS_DATABASE", config.database.to_string())
            .env("INTERVAL", config.interval.as_secs().to_string())
            .env("COUNT", "1")
            .env_remove("PIDFILE");
        match config.log_level {
            LogLevel::Verbose => command.env("VVERBOSE", "1"),
            LogLevel::Normal => command.env("LOGGING", "1"),
            LogLevel::None => command.env_remove("LOGGING"),
        };
        if let Some(timeout) = config.job_timeout {
            command.env("JOB_TIMEOUT", timeout.as_secs().to_string());
        }

        let child = command.spawn().map_err(resq::error::ResqError::Fork)?;
        tracing::info!(pid = ?child.id(), "Started worker process");
        children.push(child);
    }

    for mut child in children {
        let pid = child.id();
        let status = child.wait().await?;
        tracing::info!(pid = ?pid, status = %status, "Worker process exited");
    }
    Ok(())
}

// =============================================================================
// Job process
// =============================================================================

async fn run_perform(args: BackendArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let store = store::connect(&args.config()?, args.database).await?;
    child::perform_from_env(store.as_ref(), &JobRegistry::with_builtins()).await?;
    Ok(())
}

// =============================================================================
// Enqueue
// =============================================================================

async fn run_enqueue(args: EnqueueArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warn");

    let job_args: Vec<Value> = serde_json::from_str(&args.args)?;
    let store = store::connect(&args.backend.config()?, args.backend.database).await?;
    let id = queue::enqueue(store.as_ref(), &args.queue, &args.class, job_args, args.track).await?;
    println!("{}", id);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Work(work_args) => run_work(work_args).await?,
        Commands::Enqueue(enqueue_args) => run_enqueue(enqueue_args).await?,
        Commands::Perform(backend_args) => run_perform(backend_args).await?,
    }

    Ok(())
}
