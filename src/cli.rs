use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "regforge", about = "Disposable-account provisioning pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run registration attempts
    Register {
        /// Number of attempts to run
        #[arg(short = 'n', long)]
        attempts: Option<usize>,

        /// Concurrently running attempts
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Proceed without a proxy when the pool is exhausted
        #[arg(long)]
        allow_direct: bool,
    },
    /// Show proxy pool statistics
    ProxyStats {
        /// Include per-endpoint usage counts
        #[arg(long)]
        details: bool,
    },
}
