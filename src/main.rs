mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Keep memory flat across many short-lived browser sessions.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use regforge_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment variable overrides for batch tuning
    let parse_count =
        |v: &str| -> Option<usize> { v.parse::<usize>().ok().filter(|&n| n > 0 && n <= 128) };

    if let Ok(v) = std::env::var("REGFORGE_ATTEMPTS") {
        if let Some(n) = parse_count(&v) {
            config.general.attempts = n;
        }
    }
    if let Ok(v) = std::env::var("REGFORGE_CONCURRENCY") {
        if let Some(n) = parse_count(&v) {
            config.general.max_concurrency = n;
        }
    }
    if let Ok(v) = std::env::var("REGFORGE_REQUIRE_PROXY") {
        config.proxy.require_proxy = v != "0" && v.to_lowercase() != "false";
    }

    match cli.command {
        Commands::Register {
            attempts,
            concurrency,
            allow_direct,
        } => {
            commands::register::run(config, attempts, concurrency, allow_direct).await?;
        }
        Commands::ProxyStats { details } => {
            commands::proxy_stats::run(config, details).await?;
        }
    }

    Ok(())
}
