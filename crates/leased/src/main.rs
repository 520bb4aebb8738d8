//! leased — the lease lifecycle binary.
//!
//! One binary for everything that runs on the leased instance:
//! - `bootstrap`: first-boot provisioning, exactly once per instance
//! - `sync`: periodic save-state sync plus the on-demand control socket
//! - `idle`: idle-shutdown daemon, requesting its final sync over the socket
//! - `standalone`: sync and idle daemons in one process
//!
//! plus the operator-side helpers `describe`, `plan` and `verify`.
//!
//! # Usage
//!
//! ```text
//! leased describe --bucket my-saves > lease.toml
//! leased bootstrap --descriptor lease.toml --state-dir /var/lib/leased
//! leased standalone --descriptor lease.toml --config /etc/leased.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod signal;

const DEFAULT_FILTER: &str = "info,leased=debug,lease=debug";

#[derive(Parser)]
#[command(
    name = "leased",
    about = "Ephemeral game-server lease: bootstrap and lifecycle daemons",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the reference lease descriptor for a save bucket.
    Describe {
        /// Durable-storage bucket name.
        #[arg(long)]
        bucket: String,
    },
    /// Print the bootstrap plan a descriptor would run.
    Plan {
        #[arg(long)]
        descriptor: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Run the bootstrap plan once for this instance.
    Bootstrap {
        #[arg(long)]
        descriptor: PathBuf,
        /// Where the completion marker is kept.
        #[arg(long, default_value = "/var/lib/leased")]
        state_dir: PathBuf,
    },
    /// Check the completion marker against a descriptor; fails on drift.
    Verify {
        #[arg(long)]
        descriptor: PathBuf,
        #[arg(long, default_value = "/var/lib/leased")]
        state_dir: PathBuf,
    },
    /// Run the state sync daemon.
    Sync {
        /// Daemon config (leased.toml). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Lease descriptor supplying the sync destination.
        #[arg(long)]
        descriptor: Option<PathBuf>,
    },
    /// Run the idle-shutdown daemon.
    Idle {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the sync and idle-shutdown daemons in one process.
    Standalone {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        descriptor: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Describe { bucket } => commands::plan::describe(&bucket),
        Command::Plan { descriptor, format } => {
            commands::plan::plan(&descriptor, matches!(format, Format::Json))
        }
        Command::Bootstrap {
            descriptor,
            state_dir,
        } => commands::bootstrap::bootstrap(&descriptor, &state_dir).await,
        Command::Verify {
            descriptor,
            state_dir,
        } => commands::bootstrap::verify(&descriptor, &state_dir),
        Command::Sync { config, descriptor } => {
            commands::daemons::run_sync(config.as_deref(), descriptor.as_deref()).await
        }
        Command::Idle { config } => commands::daemons::run_idle(config.as_deref()).await,
        Command::Standalone { config, descriptor } => {
            commands::daemons::run_standalone(config.as_deref(), descriptor.as_deref()).await
        }
    }
}
