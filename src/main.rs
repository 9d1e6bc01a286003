use anyhow::{Context, Result};
use axum::serve;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use swarm_tracker::core::config::Config;
use swarm_tracker::core::routes::build_router;
use swarm_tracker::core::startup::restore_from_wal;
use swarm_tracker::core::state::AppState;
use swarm_tracker::core::tracing_init::init_tracing;
use swarm_tracker::engine::sweeper::spawn_sweeper;
use swarm_tracker::udp::server::spawn_udp_server;
use swarm_tracker::wal::wal::Wal;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

fn main() -> Result<()> {
    let config_path = env::args().nth(1).map(PathBuf::from);

    // Load and validate configuration
    let config = Config::load(config_path.as_deref()).context(
        "Failed to load configuration. \
        Copy config.example.toml to config.toml and adjust the values, or run without a config file to use defaults.",
    )?;

    init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<()> {
    info!(
        http_port = config.server.http_port,
        udp_port = ?config.server.udp_port(),
        udp_protocol = ?config.udp.protocol,
        access_mode = ?config.access.mode,
        num_threads = config.server.num_threads,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "Swarm tracker starting"
    );

    let wal = Wal::new(&config.storage.wal_path).context("Failed to initialize WAL")?;
    info!(wal_path = %wal.path().display(), "WAL initialized");

    let state = Arc::new(AppState::new(config.clone(), wal));

    // Counters and access list changes from previous runs
    restore_from_wal(&state).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = spawn_sweeper(Arc::clone(&state), shutdown_rx.clone());
    info!(
        sweep_interval_seconds = config.eviction.sweep_interval_secs,
        peer_timeout_seconds = config.eviction.peer_timeout_secs,
        "Peer sweeper started"
    );

    let udp = match config.server.udp_port() {
        Some(port) => Some(
            spawn_udp_server(
                Arc::clone(&state),
                SocketAddr::from(([0, 0, 0, 0], port)),
                shutdown_rx.clone(),
            )
            .await?,
        ),
        None => {
            info!("UDP transport disabled");
            None
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener to {}", addr))?;
    info!(address = %addr, "TCP listener bound successfully");

    info!(
        active_swarms = state.swarm_store.active_swarms(),
        "Swarm tracker startup complete"
    );

    let app = build_router(Arc::clone(&state));
    let served = serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // Stop background tasks whether the server exited cleanly or not
    if shutdown_tx.send(true).is_err() {
        error!("Background tasks already gone at shutdown");
    }

    if let Err(e) = sweeper.await {
        error!(error = %e, "Sweeper task failed");
    }
    if let Some(udp) = udp {
        if let Err(e) = udp.await {
            error!(error = %e, "UDP server task failed");
        }
    }

    served.context("HTTP server error")?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
