use anyhow::Result;
use clap::Parser;

use wasmward_core::config::WasmwardConfig;
use wasmward_daemon::cli::DaemonCli;
use wasmward_daemon::{logging, orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // Config file is optional: fall back to defaults when absent
    let mut config = if cli.config.exists() {
        WasmwardConfig::load(&cli.config)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?
    } else {
        WasmwardConfig::default()
    };

    // CLI overrides take precedence over the config file
    if let Some(rules) = cli.rules {
        config.rules.path = rules;
    }
    if let Some(log_level) = cli.log_level {
        config.general.log_level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        config.general.log_format = log_format;
    }
    if let Some(webhook) = cli.webhook {
        config.webhook.url = Some(webhook);
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rules = %config.rules.path,
        "wasmward-daemon starting"
    );

    let mut orchestrator = orchestrator::Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("wasmward-daemon shut down");
    Ok(())
}
