//! SimScale CLI - run scale-out simulation campaigns on a batch service.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use simscale_client::HttpBackend;
use simscale_core::{JobId, NodeStateCounts, PoolId, Secret};
use simscale_orchestrator::credentials::provider_from_config;
use simscale_orchestrator::{
    Campaign, CampaignReport, CliOverrides, ComputeBackend, ConfigError, FileConfig,
    InMemoryBackend, OutputCollector, PoolBackend, Progression, TaskBackend, TeardownManager,
    DEFAULT_OUTPUT_FILE,
};

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// SimScale CLI - scale-out simulation runner
#[derive(Parser)]
#[command(name = "simscale")]
#[command(about = "Run simulation replicas at scale on a batch compute service", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "simscale.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use an in-memory backend; nothing is provisioned
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the pool, create a job and submit every replica
    #[command(name = "run")]
    Run(RunArgs),

    /// Delete a job and its tasks
    #[command(name = "stop-job")]
    StopJob {
        /// Job ID
        id: String,
    },

    /// Delete a pool
    #[command(name = "kill-pool")]
    KillPool {
        /// Pool ID (defaults to the configured pool)
        #[arg(long)]
        pool_id: Option<String>,
    },

    /// Delete every job on the account
    #[command(name = "delete-jobs")]
    DeleteJobs,

    /// List pools
    #[command(name = "list-pools")]
    ListPools,

    /// List the tasks of a job
    #[command(name = "list-tasks")]
    ListTasks {
        /// Job ID
        job: String,
    },

    /// Show node counts of a pool
    #[command(name = "pool-nodes")]
    PoolNodes {
        /// Pool ID (defaults to the configured pool)
        #[arg(long)]
        pool_id: Option<String>,
    },

    /// Print an output file of every task in a job
    #[command(name = "logs")]
    Logs {
        /// Job ID
        job: String,

        /// File to read from each task directory
        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        file: String,
    },
}

/// Overrides for the `[pool]` and `[campaign]` settings.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Number of replicas
    #[arg(short = 'n', long)]
    replicas: Option<u32>,

    #[arg(long)]
    pool_id: Option<String>,

    /// VM size, or `none` to size automatically
    #[arg(long)]
    vm_size: Option<String>,

    #[arg(long)]
    dedicated_nodes: Option<u32>,

    #[arg(long)]
    low_priority_nodes: Option<u32>,

    /// Command line run in every replica
    #[arg(long)]
    command: Option<String>,

    /// Campaign name, used in task and job ids
    #[arg(long)]
    campaign: Option<String>,

    #[arg(long)]
    job_id: Option<String>,

    #[arg(long)]
    image_name: Option<String>,

    #[arg(long)]
    image_version: Option<String>,

    /// Working directory inside the container
    #[arg(long)]
    workdir: Option<String>,

    /// Mount the configured file share on every node
    #[arg(long, overrides_with = "no_fileshare")]
    use_fileshare: bool,

    /// Do not mount the file share, whatever the config file says
    #[arg(long, overrides_with = "use_fileshare")]
    no_fileshare: bool,

    /// Block until every task completes
    #[arg(long, overrides_with = "no_wait")]
    wait: bool,

    /// Return once tasks are submitted, whatever the config file says
    #[arg(long, overrides_with = "wait")]
    no_wait: bool,

    /// Completion deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    workspace: Option<String>,

    #[arg(long)]
    access_key: Option<String>,
}

/// Fold an `--x`/`--no-x` flag pair into an override. Neither flag leaves
/// the config file value in place.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl From<RunArgs> for CliOverrides {
    fn from(args: RunArgs) -> Self {
        Self {
            pool_id: args.pool_id,
            vm_size: args.vm_size,
            dedicated_nodes: args.dedicated_nodes,
            low_priority_nodes: args.low_priority_nodes,
            replicas: args.replicas,
            command: args.command,
            campaign: args.campaign,
            job_id: args.job_id,
            image_name: args.image_name,
            image_version: args.image_version,
            use_fileshare: switch(args.use_fileshare, args.no_fileshare),
            wait: switch(args.wait, args.no_wait),
            wait_timeout_secs: args.timeout_secs,
            workdir: args.workdir,
            workspace: args.workspace,
            access_key: args.access_key.map(Secret::new),
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut file = load_config(&cli.config, cli.dry_run)?;
    let backend = connect(&file, cli.dry_run)?;
    let backend = backend.as_ref();

    match cli.command {
        Commands::Run(args) => {
            file.apply(args.into());
            run(backend, &file).await?;
        }
        Commands::StopJob { id } => {
            TeardownManager::new(backend)
                .delete_job(&JobId::new(id))
                .await?;
        }
        Commands::KillPool { pool_id } => {
            let pool_id = resolve_pool_id(&file, pool_id)?;
            TeardownManager::new(backend).delete_pool(&pool_id).await?;
        }
        Commands::DeleteJobs => {
            delete_jobs(backend).await?;
        }
        Commands::ListPools => {
            list_pools(backend).await?;
        }
        Commands::ListTasks { job } => {
            list_tasks(backend, JobId::new(job)).await?;
        }
        Commands::PoolNodes { pool_id } => {
            let pool_id = resolve_pool_id(&file, pool_id)?;
            pool_nodes(backend, pool_id).await?;
        }
        Commands::Logs { job, file: path } => {
            logs(backend, JobId::new(job), &path).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path, dry_run: bool) -> CliResult<FileConfig> {
    match FileConfig::from_file(path) {
        Ok(file) => Ok(file),
        Err(ConfigError::Io { .. }) if dry_run => {
            warn!(path = %path.display(), "No config file, using defaults for dry run");
            Ok(FileConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn connect(file: &FileConfig, dry_run: bool) -> CliResult<Box<dyn ComputeBackend>> {
    if dry_run {
        info!("Dry run: using the in-memory backend");
        return Ok(Box::new(InMemoryBackend::with_progression(
            Progression::AdvanceOnList,
        )));
    }

    let config = file.backend_config()?;
    info!(
        account = %config.account_name,
        url = %config.account_url,
        authenticated = config.token.is_some(),
        "Using batch service"
    );
    Ok(Box::new(HttpBackend::new(&config)?))
}

fn resolve_pool_id(file: &FileConfig, explicit: Option<String>) -> CliResult<PoolId> {
    match explicit {
        Some(id) => Ok(PoolId::new(id)),
        None => Ok(file.pool_id()?),
    }
}

async fn run(backend: &dyn ComputeBackend, file: &FileConfig) -> CliResult {
    let config = file.campaign_config()?;
    let credentials = provider_from_config(&file.credentials).resolve()?;

    let report = Campaign::new(backend, &config, credentials).run().await?;
    print_report(&report);

    // Tasks already submitted stay in the job; the failure is still an error.
    report.fanout.into_result()?;
    Ok(())
}

fn print_report(report: &CampaignReport) {
    let fanout = &report.fanout;

    println!("Campaign submitted:");
    println!("  Pool:       {}", report.pool.id);
    println!("  Job:        {}", report.job.id);
    println!(
        "  VM size:    {} ({} tasks/node)",
        report.sizing.vm_size(),
        report.sizing.tasks_per_node
    );
    println!("  Submitted:  {}/{}", fanout.submitted.len(), fanout.attempted());
    for failure in &fanout.failed {
        println!("    - {} failed: {}", failure.task_id, failure.error);
    }

    if let Some(completion) = &report.completion {
        println!(
            "  Completed:  {} succeeded, {} non-zero exit, in {:.1?}",
            completion.succeeded.len(),
            completion.failed.len(),
            completion.elapsed
        );
        for id in &completion.failed {
            println!("    - {id}");
        }
    }
}

async fn delete_jobs(backend: &dyn ComputeBackend) -> CliResult {
    let outcomes = TeardownManager::new(backend).delete_all_jobs().await?;

    println!("Jobs ({}):", outcomes.len());
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => println!("  {:<48}  deleted", outcome.job_id),
            Err(e) => println!("  {:<48}  failed: {e}", outcome.job_id),
        }
    }

    Ok(())
}

async fn list_pools(backend: &dyn ComputeBackend) -> CliResult {
    let pools = backend.list_pools().await?;

    println!("Pools ({}):", pools.len());
    for pool in pools {
        println!("  {pool}");
    }

    Ok(())
}

async fn list_tasks(backend: &dyn ComputeBackend, job_id: JobId) -> CliResult {
    let tasks = backend.list_tasks(&job_id).await?;

    println!("Tasks ({}):", tasks.len());
    println!("{:<40}  {:<10}  {:<24}  {}", "ID", "STATE", "NODE", "EXIT");
    println!("{}", "-".repeat(84));

    for task in tasks {
        let node = task.node_id.as_ref().map(|n| n.as_str()).unwrap_or("-");
        let exit = task
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40}  {:<10}  {:<24}  {}",
            task.id,
            task.state.as_str(),
            node,
            exit
        );
    }

    Ok(())
}

async fn pool_nodes(backend: &dyn ComputeBackend, pool_id: PoolId) -> CliResult {
    let counts = backend.pool_node_counts(&pool_id).await?;

    println!("Pool {}:", counts.pool_id);
    println!(
        "{:<14}  {:>8}  {:>8}  {:>6}  {:>7}  {:>8}  {:>9}  {:>5}",
        "PRIORITY", "CREATING", "STARTING", "IDLE", "RUNNING", "UNUSABLE", "PREEMPTED", "TOTAL"
    );
    println!("{}", "-".repeat(84));
    print_node_row("dedicated", &counts.dedicated);
    print_node_row("low-priority", &counts.low_priority);

    Ok(())
}

fn print_node_row(label: &str, c: &NodeStateCounts) {
    println!(
        "{:<14}  {:>8}  {:>8}  {:>6}  {:>7}  {:>8}  {:>9}  {:>5}",
        label, c.creating, c.starting, c.idle, c.running, c.unusable, c.preempted, c.total
    );
}

async fn logs(backend: &dyn ComputeBackend, job_id: JobId, path: &str) -> CliResult {
    let outputs = OutputCollector::new(backend).collect(&job_id, path).await?;

    for output in outputs {
        let node = output.node_id.as_ref().map(|n| n.as_str()).unwrap_or("-");
        println!("==> {} on {} <==", output.task_id, node);
        match output.text {
            Ok(text) => {
                print!("{text}");
                if !text.ends_with('\n') {
                    println!();
                }
            }
            Err(e) => println!("<unavailable: {e}>"),
        }
    }

    Ok(())
}
