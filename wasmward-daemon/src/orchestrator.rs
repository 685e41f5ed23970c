//! Daemon orchestration -- assembly, rule loading, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `wasmward-daemon`.
//! It loads configuration, builds the rule registry and sinks, wires the
//! event pipeline, and runs the main loop until a shutdown signal arrives.
//!
//! # Assembly order (producers before consumers)
//!
//! 1. Metrics recorder (so every later component can record)
//! 2. Rule registry + rule compilation
//! 3. Sinks (log, optional webhook, metrics) into the multi-sink
//! 4. Collectors (process, network)
//! 5. Event pipeline wiring them all together
//!
//! # Shutdown
//!
//! A single cancellation cascade: collectors stop publishing, fan-in
//! tasks drain already-received events, the detector exits at the next
//! queue read, and sinks are closed in registration order within the
//! configured grace window.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use wasmward_core::config::WasmwardConfig;
use wasmward_core::metrics as m;
use wasmward_engine::RuleRegistry;
use wasmward_pipeline::{EventPipeline, EventPipelineBuilder, NetworkCollector, ProcessCollector};
use wasmward_sinks::{LogSink, MetricsSink, MultiSink, WebhookSinkBuilder};

use crate::metrics_server;

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: WasmwardConfig,
    registry: Arc<RuleRegistry>,
    pipeline: EventPipeline,
    start_time: Instant,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WasmwardConfig::load(config_path)
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when CLI overrides have been applied.
    pub async fn build_from_config(config: WasmwardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before anything records
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        // Rule registry + rules
        let registry = Arc::new(RuleRegistry::new());
        load_rules(&registry, &config.rules.path).await?;

        // Sinks, in registration order: log, webhook (if configured), metrics
        let sinks = build_sinks(&config).await?;
        tracing::info!(sinks = sinks.count(), "sink dispatcher assembled");

        // Pipeline wiring
        let mut builder = EventPipelineBuilder::new()
            .config(config.pipeline.clone())
            .registry(Arc::clone(&registry))
            .sinks(Arc::new(sinks));

        if config.collectors.process.enabled {
            tracing::info!("enabling process collector");
            let collector = ProcessCollector::new(
                config.collectors.process.clone(),
                config.pipeline.collector_channel_capacity,
            )
            .map_err(|e| anyhow::anyhow!("failed to build process collector: {}", e))?;
            builder = builder.collector(Box::new(collector));
        }

        if config.collectors.network.enabled {
            tracing::info!("enabling network collector");
            let collector = NetworkCollector::new(
                config.collectors.network.clone(),
                config.pipeline.collector_channel_capacity,
            );
            builder = builder.collector(Box::new(collector));
        }

        let pipeline = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build event pipeline: {}", e))?;

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            registry,
            pipeline,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and block until a shutdown signal is received.
    pub async fn run(&mut self) -> Result<()> {
        self.pipeline
            .start()
            .map_err(|e| anyhow::anyhow!("failed to start event pipeline: {}", e))?;

        let mut uptime_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(self.start_time))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        if let Some(task) = uptime_task.take() {
            task.abort();
        }

        self.shutdown().await
    }

    /// Perform graceful shutdown: stop the pipeline, then close the registry.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.pipeline.stop().await {
            tracing::error!(error = %e, "pipeline stop reported an error");
        }
        if let Err(e) = self.registry.close() {
            tracing::warn!(error = %e, "failed to close rule registry");
        }
        tracing::info!(
            processed = self.pipeline.processed_count(),
            detections = self.pipeline.detection_count(),
            dropped = self.pipeline.dropped_count(),
            "wasmward-daemon stopped"
        );
        Ok(())
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &WasmwardConfig {
        &self.config
    }

    /// Get a handle to the rule registry.
    pub fn registry(&self) -> Arc<RuleRegistry> {
        Arc::clone(&self.registry)
    }

    /// Mutable access to the event pipeline (integration tests, embedding).
    pub fn pipeline_mut(&mut self) -> &mut EventPipeline {
        &mut self.pipeline
    }
}

/// Load rules from a path that is either a single `.wasm` file or a
/// directory tree of rule modules.
///
/// Compilation is CPU-bound, so the work runs on the blocking pool.
async fn load_rules(registry: &Arc<RuleRegistry>, rules_path: &str) -> Result<()> {
    let path = Path::new(rules_path);
    let meta = std::fs::metadata(path)
        .map_err(|_| anyhow::anyhow!("rules path does not exist: {}", rules_path))?;

    let registry = Arc::clone(registry);
    let rules_path = rules_path.to_owned();
    let loaded = tokio::task::spawn_blocking(move || {
        let path = Path::new(&rules_path);
        if meta.is_dir() {
            registry.load_rules_from_dir(path)
        } else {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|_| path.extension().is_some_and(|ext| ext == "wasm"))
                .ok_or_else(|| wasmward_core::error::EngineError::Io {
                    path: rules_path.clone(),
                    reason: "rule file must have a .wasm extension".to_owned(),
                })?;
            registry.load_rule(stem.to_owned(), path)?;
            Ok(1)
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("rule loading task failed: {}", e))?
    .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?;

    tracing::info!(count = loaded, "rule modules loaded");
    Ok(())
}

/// Assemble the sink dispatcher in registration order.
async fn build_sinks(config: &WasmwardConfig) -> Result<MultiSink> {
    let mut multi = MultiSink::new();

    let log_sink = LogSink::new(config.general.log_file.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("failed to create log sink: {}", e))?;
    multi.register(Box::new(log_sink));

    if let Some(url) = &config.webhook.url {
        tracing::info!(url = %url, batch_size = config.webhook.batch_size, "enabling webhook sink");
        let webhook = WebhookSinkBuilder::new(url.clone())
            .headers(config.webhook.headers.clone())
            .batch_size(config.webhook.batch_size)
            .timeout(Duration::from_secs(config.webhook.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create webhook sink: {}", e))?;
        multi.register(Box::new(webhook));
    }

    multi.register(Box::new(MetricsSink::new()));

    Ok(multi)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(start_time: Instant) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
        }
    })
}
