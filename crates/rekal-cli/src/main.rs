mod cmd_checkpoint;
mod cmd_config;
mod cmd_init;
mod cmd_log;
mod cmd_push;
mod cmd_sync;
mod preconditions;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "REKAL_LOG";

#[derive(Parser)]
#[command(
    name = "rekal",
    version,
    about = "Agent session memory that travels with your git repository"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize Rekal in the current git repository
    Init,
    /// Capture new agent sessions against the current commit
    Checkpoint,
    /// Export captured sessions to the rekal branch and push it
    Push {
        /// Overwrite the remote branch with local data
        #[arg(short, long)]
        force: bool,
    },
    /// Fetch and import every rekal branch from the remote
    Sync,
    /// Show recent checkpoints
    Log {
        /// Maximum number of checkpoints to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Read or change .rekal/config.json
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    match cli.cmd {
        Command::Init => cmd_init::execute(&cwd),
        Command::Checkpoint => cmd_checkpoint::execute(&cwd),
        Command::Push { force } => cmd_push::execute(&cwd, force),
        Command::Sync => cmd_sync::execute(&cwd),
        Command::Log { limit } => cmd_log::execute(&cwd, limit),
        Command::Config { cmd } => cmd_config::run(cmd, &cwd),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(err) = run(cli) {
        if !rekal_core::is_silent(&err) {
            eprintln!("rekal: {err:#}");
        }
        std::process::exit(1);
    }
}
