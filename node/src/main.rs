use anyhow::Result;
use blockfill_node::config::NodeConfig;
use blockfill_node::logging::{self, LogConfig, LogFormat, RunId};
use blockfill_node::metrics;
use blockfill_node::pipeline::{self, Pipeline};
use blockfill_sync::{CancellationToken, Height, SyncError};
use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockfill")]
#[command(about = "Backfill missing blocks from a remote node into a local store")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Remote node JSON-RPC endpoint
    #[arg(long, value_name = "URL")]
    rpc_url: Option<String>,

    /// Keep blocks in memory instead of on disk
    #[arg(long)]
    memory: bool,

    /// Heights fetched together as one job
    #[arg(long)]
    batch_size: Option<usize>,

    /// Heights admitted to the queue at once
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Queue depth at which admission waits
    #[arg(long)]
    queue_threshold: Option<usize>,

    /// Stop gap detection after this many gaps
    #[arg(long)]
    gap_limit: Option<usize>,

    /// Skip interior gaps larger than this
    #[arg(long)]
    max_gap_size: Option<u64>,

    /// Lowest height the store should hold
    #[arg(long)]
    start_height: Option<Height>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Log output: compact, pretty or json (overrides LOG_FORMAT)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// More detail from blockfill crates (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass and wait for the queued batches to finish
    Sync,

    /// Run passes on the poll interval until interrupted
    Follow,

    /// Print missing ranges without fetching anything
    Gaps {
        /// Detect against this height instead of asking the remote node
        #[arg(long)]
        target: Option<Height>,
    },

    /// Show store contents and the remote tip
    Status,

    /// Write a configuration file with default values
    InitConfig {
        /// Destination (defaults to ~/.blockfill/config.toml)
        #[arg(long, value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::resolve(cli.log_format, cli.verbose);
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("Warning: Failed to initialize structured logging: {}", e);
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("blockfill=info".parse()?))
            .init();
    }

    if let Commands::InitConfig { path, force } = &cli.command {
        return init_config(path.clone(), *force);
    }

    let config = load_config(&cli)?;
    let run_id = RunId::new();
    let span = info_span!("blockfill", run_id = %run_id);
    run(cli.command, config).instrument(span).await
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => {
            let default_path = NodeConfig::default_path();
            if default_path.exists() {
                info!(path = %default_path.display(), "Loading configuration");
                NodeConfig::from_file(&default_path)?
            } else {
                NodeConfig::default()
            }
        }
    };

    config.apply_env();

    // Override with CLI args
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(url) = &cli.rpc_url {
        config.rpc.url = url.clone();
    }
    if cli.memory {
        config.storage.in_memory = true;
    }
    if let Some(batch_size) = cli.batch_size {
        config.sync.batch_size = batch_size;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.sync.chunk_size = chunk_size;
    }
    if let Some(threshold) = cli.queue_threshold {
        config.sync.queue_threshold = threshold;
    }
    if cli.gap_limit.is_some() {
        config.sync.gap_limit = cli.gap_limit;
    }
    if cli.max_gap_size.is_some() {
        config.sync.max_gap_size = cli.max_gap_size;
    }
    if cli.start_height.is_some() {
        config.sync.start_height = cli.start_height;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics.enabled = true;
        config.metrics.listen_addr = addr;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(NodeConfig::default_path);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    NodeConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run(command: Commands, config: NodeConfig) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::init_metrics(config.metrics.listen_addr) {
            warn!("Metrics disabled: {}", e);
        }
    }

    let store = pipeline::open_store(&config.storage)?;
    let source = pipeline::connect(&config)?;

    match command {
        Commands::Status => {
            let report = pipeline::status(&*store, &*source, &config.sync).await?;
            println!("{}", report);
            Ok(())
        }
        Commands::Gaps { target } => {
            let (target, report) =
                pipeline::find_gaps(&*store, Some(&*source), &config.sync, target).await?;
            println!("target height: {}", target);
            for gap in &report.gaps {
                println!("missing  {} ({} heights)", gap, gap.len());
            }
            for gap in &report.skipped {
                println!("skipped  {} ({} heights, over max_gap_size)", gap, gap.len());
            }
            if report.truncated {
                println!("gap limit reached; more gaps may exist");
            }
            println!("total missing: {}", report.missing_heights());
            Ok(())
        }
        Commands::Sync => {
            let cancel = cancel_on_ctrl_c();
            let pipeline = Pipeline::start(&config, store, source)?;
            let scheduled = match pipeline.sync_once(&cancel).await {
                Ok(summary) => {
                    info!(
                        target = summary.target_height,
                        heights = summary.heights_scheduled,
                        batches = summary.batches_submitted,
                        "Pass scheduled; waiting for batches to finish"
                    );
                    Ok(())
                }
                Err(SyncError::Cancelled) => {
                    warn!("Interrupted; abandoning remaining work");
                    Ok(())
                }
                Err(e) => Err(e),
            };

            if scheduled.is_ok() && !pipeline.drain(&cancel).await {
                warn!("Interrupted; abandoning queued batches");
            }
            let stats = pipeline.shutdown().await;
            println!(
                "persisted {} heights, {} failed ({:.1}% success) over {} batch executions",
                stats.heights_persisted,
                stats.heights_failed,
                stats.success_rate(),
                stats.executions()
            );
            scheduled.map_err(Into::into)
        }
        Commands::Follow => {
            let cancel = cancel_on_ctrl_c();
            let pipeline = Pipeline::start(&config, store, source)?;
            let result = pipeline.follow(&cancel).await;
            let stats = pipeline.shutdown().await;
            info!(
                persisted = stats.heights_persisted,
                failed = stats.heights_failed,
                "Follow mode stopped"
            );
            result.map_err(Into::into)
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                trigger.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });
    cancel
}
