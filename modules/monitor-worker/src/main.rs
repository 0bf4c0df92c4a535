use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bluesky_client::BlueskyClient;
use gemini_client::GeminiClient;
use monitor_worker::{
    filter::NewsworthinessFilter, notify::TalkbackClient, router, start_worker, Config, Pipeline,
    PipelineStats,
};

#[derive(Parser)]
#[command(name = "monitor-worker", about = "Bluesky news monitor task worker")]
struct Cli {
    /// Address to bind (overrides WORKER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides WORKER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Concurrent task executions (overrides WORKER_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Monitor worker starting...");

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let gemini = GeminiClient::new(&config.gemini_api_key)
        .with_base_url(&config.gemini_base_url)
        .with_model(&config.gemini_model)
        .with_http_client(http.clone());

    let bluesky = BlueskyClient::new(&config.bluesky_identifier, &config.bluesky_password)
        .with_base_url(&config.bluesky_base_url)
        .with_reauth(config.bluesky_reauth)
        .with_http_client(http.clone());
    bluesky.login().await.context("Bluesky login failed")?;
    info!(identifier = config.bluesky_identifier.as_str(), "Bluesky session established");

    let stats = Arc::new(PipelineStats::new());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(bluesky),
        Arc::new(NewsworthinessFilter::new(gemini)),
        Arc::new(TalkbackClient::new().with_http_client(http)),
        stats.clone(),
    ));

    let (dispatcher, pool) = start_worker(pipeline, config.concurrency, config.queue_capacity);
    let app = router(dispatcher);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, concurrency = config.concurrency, "Listening for PerformTask");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining worker pool");
    pool.shutdown().await;

    info!("Monitor worker stopped. {}", stats.snapshot());
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("monitor_worker=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
