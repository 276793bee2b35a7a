//! l3schedd — the L3 router scheduler daemon.
//!
//! Runs the failover monitor against a redb state store and offers one-shot
//! administrative commands against the same store. The store file is locked
//! by whichever process opens it first, so the one-shot commands run while
//! the daemon is stopped.
//!
//! # Usage
//!
//! ```text
//! l3schedd run --data-dir /var/lib/l3sched --config /etc/l3sched.toml
//! l3schedd reschedule <router-id> --data-dir /var/lib/l3sched
//! l3schedd hosting <router-id> --data-dir /var/lib/l3sched
//! ```

mod service;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use l3sched_core::{SchedulerConfig, SchedulerDriver};

use crate::service::L3Service;

const DEFAULT_LOG_FILTER: &str = "info,l3schedd=debug,l3sched=debug";

#[derive(Parser)]
#[command(name = "l3schedd", about = "L3 router scheduler daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Data directory for persistent state.
    #[arg(long, default_value = "/var/lib/l3sched")]
    data_dir: PathBuf,

    /// Scheduler configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `router_scheduler_driver` (chance | least_routers).
    #[arg(long)]
    driver: Option<SchedulerDriver>,

    /// Override `agent_down_time` (seconds).
    #[arg(long)]
    agent_down_time: Option<u64>,

    /// Enable automatic failover regardless of the configuration file.
    #[arg(long)]
    failover: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the failover monitor until interrupted.
    Run {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Move a router to a freshly chosen agent.
    Reschedule {
        router_id: String,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print the agents hosting a router.
    Hosting {
        router_id: String,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { store } => run(&store).await,
        Command::Reschedule { router_id, store } => {
            let service = L3Service::open(&store.data_dir, load_config(&store)?)?;
            let agents = service.reschedule(&router_id)?;
            let out = serde_json::json!({ "router_id": router_id, "agents": agents });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Command::Hosting { router_id, store } => {
            let service = L3Service::open(&store.data_dir, load_config(&store)?)?;
            let agents = service.hosting(&router_id)?;
            println!("{}", serde_json::to_string_pretty(&agents)?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Configuration file (or defaults) with command-line overrides applied.
fn load_config(args: &StoreArgs) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => SchedulerConfig::default(),
    };
    if let Some(driver) = args.driver {
        config.router_scheduler_driver = driver;
    }
    if let Some(secs) = args.agent_down_time {
        config.agent_down_time = secs;
    }
    if args.failover {
        config.allow_automatic_l3agent_failover = true;
    }
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<SchedulerConfig> {
    let config = SchedulerConfig::from_file(path)?;
    info!(path = ?path, "configuration loaded");
    Ok(config)
}

async fn run(args: &StoreArgs) -> anyhow::Result<()> {
    info!("l3 scheduler daemon starting");
    let service = L3Service::open(&args.data_dir, load_config(args)?)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(service.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    handle.await??;
    info!("l3 scheduler daemon stopped");
    Ok(())
}
