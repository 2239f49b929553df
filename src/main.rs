use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use nexus_outreach::config::NexusConfig;
use nexus_outreach::dispatch::{CampaignRunner, DispatchController, DispatchMetrics, spawn_runner};
use nexus_outreach::llm::{LlmConfig, LlmOracle, create_provider};
use nexus_outreach::pipeline::{GoogleSearchConfig, GoogleSearcher, IntentGate, LeadPipeline};
use nexus_outreach::quota::RateLimiter;
use nexus_outreach::status::spawn_status_server;
use nexus_outreach::store::{Database, LibSqlBackend};

/// Console logging always; a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_target(false).with_filter(filter());

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nexus.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = NexusConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📨 nexus-outreach v{}", env!("CARGO_PKG_VERSION"));

    // ── External capabilities ───────────────────────────────────────
    let search_config = GoogleSearchConfig::from_env()?;
    let searcher = Arc::new(GoogleSearcher::new(search_config)?);

    let llm_config = LlmConfig::from_env()?;
    let llm = create_provider(&llm_config)?;
    let oracle = Arc::new(LlmOracle::new(llm));
    eprintln!("   Oracle: {} ({})", llm_config.backend.name(), llm_config.model);

    let capabilities = Arc::new(config.build_capabilities()?);
    eprintln!(
        "   Channels: {}",
        capabilities
            .channels()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // ── Database ────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Scheduling ──────────────────────────────────────────────────
    let metrics = Arc::new(DispatchMetrics::new());
    let limiter = Arc::new(RateLimiter::new(&capabilities.limits(), config.limiter.clone()));

    let pipeline = LeadPipeline::new(searcher).with_metrics(Arc::clone(&metrics));
    let gate = IntentGate::new(oracle)
        .with_timeout(llm_config.timeout)
        .with_metrics(Arc::clone(&metrics));

    let controller = Arc::new(
        DispatchController::new(
            Arc::clone(&capabilities),
            Arc::clone(&limiter),
            pipeline,
            gate,
            Arc::clone(&db),
            Arc::clone(&metrics),
        )
        .with_config(config.dispatch.clone()),
    );

    // ── Status server ───────────────────────────────────────────────
    if let Some(port) = config.status_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (bound, _handle) =
            spawn_status_server(addr, Arc::clone(&metrics), Arc::clone(&limiter)).await?;
        eprintln!("   Status: http://{bound}/health");
    }

    // ── Watch loop ──────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let runner = Arc::new(CampaignRunner::new(
        controller,
        Arc::clone(&db),
        config.runner.clone(),
    ));
    let runner_handle = spawn_runner(runner, shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    runner_handle.await.context("Campaign runner panicked")?;

    metrics.log_status();
    Ok(())
}
