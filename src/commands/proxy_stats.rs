use anyhow::Result;

use regforge_core::config::AppConfig;
use regforge_proxy::{ProxyRotation, ProxyVariant};

/// Proxy-stats command - pool health and, optionally, per-endpoint usage.
pub async fn run(config: AppConfig, details: bool) -> Result<()> {
    let proxies = ProxyRotation::new(
        &config.proxy.pool_dir,
        &config.proxy.usage_file,
        config.proxy.max_usage,
    );

    let stats = proxies.statistics().await;

    println!("Proxy pool ({})", config.proxy.pool_dir);
    println!("  total:     {}", stats.total);
    println!("  active:    {}", stats.active);
    println!("  exhausted: {}", stats.exhausted);
    println!();

    for variant in ProxyVariant::ALL {
        if let Some(vs) = stats.per_variant.get(&variant) {
            println!(
                "  {:<12} total {:>4}  active {:>4}  retired {:>4}",
                variant.to_string(),
                vs.total,
                vs.active,
                vs.commented
            );
        }
    }

    if details {
        println!("\nUsage counts (cap {})", config.proxy.max_usage);
        let usage = proxies.usage().await;
        if usage.is_empty() {
            println!("  no recorded usage yet");
        }
        for (connection, count) in usage {
            println!("  {:>3}x  {}", count, mask(&connection));
        }
    }

    Ok(())
}

/// Credentialed pool lines carry secrets; show host:port only.
fn mask(connection: &str) -> String {
    match connection.rsplit_once('@') {
        Some((_, host)) => format!("***@{}", host),
        None => connection.to_string(),
    }
}
