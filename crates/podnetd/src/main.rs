mod cmd;
mod config;
mod error;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "podnetd", version)]
struct Cli {
    /// YAML config file; defaults apply when omitted
    #[arg(long, env = "PODNETD_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wire a pod sandbox to the integration bridge and print the result as JSON
    Attach(cmd::AttachArgs),
    /// Remove a pod sandbox's network; succeeds if there is nothing to remove
    Detach(cmd::DetachArgs),
    /// Print the SR-IOV devices the kubelet assigned to a sandbox
    Locate(cmd::LocateArgs),
    /// Configure the node gateway NIC on the integration bridge
    NodeNic(cmd::NodeNicArgs),
    /// Configure the traffic mirror port on the integration bridge
    Mirror,
    /// Verify host prerequisites
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries command results.
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = match config::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Attach(args) => cmd::run_attach(&config, args).await,
        Command::Detach(args) => cmd::run_detach(&config, args).await,
        Command::Locate(args) => cmd::run_locate(&config, args).await,
        Command::NodeNic(args) => cmd::run_node_nic(&config, args).await,
        Command::Mirror => cmd::run_mirror(&config).await,
        Command::Check => cmd::run_check(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
