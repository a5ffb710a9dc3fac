mod handlers;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    Router,
    extract::FromRef,
    http::{StatusCode, header},
};
use pullcheck_ai::AiClient;
use pullcheck_core::config::Config;
use pullcheck_github::GitHub;
use pullcheck_jobs::{
    JobContext, JobStorage, create_monitor, dispatch::JobDispatcher, process::ProcessRunner,
};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::handlers::build_router;

const CONFIG_PATH_ENV: &str = "PULLCHECK_CONFIG";

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    dispatcher: Arc<JobDispatcher>,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run().await {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
    tracing::info!("Shut down gracefully");
}

async fn run() -> anyhow::Result<()> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.yml".to_string());
    let config = Arc::new(Config::load(&path)?);
    let github = GitHub::new(&config.github).await.context("Failed to create GitHub client")?;
    let reviewer = AiClient::new(&config.ai).context("Failed to create AI client")?;
    let jobs = JobStorage::setup(&config.queue).await.context("Failed to set up job storage")?;
    let runner = Arc::new(ProcessRunner::new(config.analysis.command_timeout()));

    let job_context = JobContext { config: config.clone(), github, reviewer, runner };
    let monitor = create_monitor(jobs.clone(), job_context, &config.queue)?;
    let state = AppState { config: config.clone(), dispatcher: Arc::new(jobs.dispatcher()) };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    tracing::info!("Web server: Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.context("Failed to bind listener")?;

    // Run both the web server and job monitor concurrently, with graceful shutdown
    let web_server = async {
        let result = axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Web server error");
        tracing::info!("Web server stopped");
        result
    };
    let job_monitor = async {
        let result =
            monitor.run_with_signal(shutdown_signal_io()).await.context("Job monitor error");
        tracing::info!("Job monitor stopped");
        result
    };

    // Wait for both to complete gracefully (early return on error)
    tokio::try_join!(web_server, job_monitor)?;
    Ok(())
}

fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers([header::AUTHORIZATION].into())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)));
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    if let Err(e) = shutdown_signal_io().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}

/// Shutdown signal that returns io::Result for apalis compatibility.
async fn shutdown_signal_io() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
