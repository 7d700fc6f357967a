use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use regforge_address::ForwardingRuleClient;
use regforge_browser::{ChromeProvisioner, SelectorTable};
use regforge_core::config::AppConfig;
use regforge_mail::GatewayMailbox;
use regforge_proxy::ProxyRotation;
use regforge_registration::{
    BatchConfig, BatchDriver, CancelFlag, EngineConfig, RegisterEngine,
};

/// Register command - run a batch of independent registration attempts.
pub async fn run(
    config: AppConfig,
    attempts: Option<usize>,
    concurrency: Option<usize>,
    allow_direct: bool,
) -> Result<()> {
    let attempts = attempts.unwrap_or(config.general.attempts);
    let concurrency = concurrency.unwrap_or(config.general.max_concurrency);

    info!(attempts, concurrency, "starting registration run");

    let provider = Arc::new(ForwardingRuleClient::new(config.forwarding.clone())?);
    let provisioner = Arc::new(ChromeProvisioner::new(config.browser.headless));
    let mailbox = Arc::new(GatewayMailbox::new(
        config.mail.gateway_url.clone(),
        config.mail.mailbox.clone(),
        config.mail.access_token.clone(),
    ));
    let proxies = Arc::new(ProxyRotation::new(
        &config.proxy.pool_dir,
        &config.proxy.usage_file,
        config.proxy.max_usage,
    ));
    let selectors = Arc::new(SelectorTable::load(
        config.browser.selector_file.as_deref().map(Path::new),
    ));

    let mut engine_config = EngineConfig::from_app(&config);
    if allow_direct {
        engine_config.require_proxy = false;
    }

    let engine = Arc::new(RegisterEngine::new(
        provider,
        provisioner,
        mailbox,
        proxies,
        selectors,
        engine_config,
    ));

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling remaining attempts");
                cancel.cancel();
            }
        });
    }

    let driver = BatchDriver::new(
        engine,
        BatchConfig {
            attempts,
            max_concurrent: concurrency,
        },
    );
    let stats = driver.run(cancel).await;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║          Registration Summary                ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Attempts:             {:>20}    ║", stats.total);
    println!("║ Succeeded:            {:>20}    ║", stats.succeeded);
    println!("║ Failed:               {:>20}    ║", stats.failed);
    println!("║ Cancelled:            {:>20}    ║", stats.cancelled);
    println!("║ Success Rate:         {:>19.1}%   ║", stats.success_rate());
    println!("╚══════════════════════════════════════════════╝\n");

    for failure in &stats.failures {
        println!(
            "  ✗ {} failed at {}: {}",
            failure.attempt_id, failure.stage, failure.reason
        );
    }

    Ok(())
}
