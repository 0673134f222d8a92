use anyhow::{Context, Result};
use axum::serve;
use checkin::core::config::Config;
use checkin::core::routes::build_router;
use checkin::core::startup::{apply_wal_operations, seed_locations};
use checkin::core::state::AppState;
use checkin::core::tracing_init::init_tracing;
use checkin::stores::session_store::SessionStore;
use checkin::stores::waiver_store::PendingWaivers;
use checkin::utils::time::now_millis;
use checkin::wal::wal::Wal;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;

    init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        bind_address = %config.server.bind_address,
        port = config.server.port,
        num_threads = config.server.num_threads,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        directory_enabled = config.directory.enabled,
        "Check-in service starting"
    );

    let wal_path = config.storage.wal_path.clone();
    let wal = Wal::new(wal_path.clone()).context("Failed to initialize WAL")?;
    info!(wal_path = %wal_path.display(), "WAL initialized");

    let state = AppState::new(config.clone(), wal)?;

    // Replay WAL operations to restore state
    info!("Replaying WAL operations");
    let operations = state.wal.replay().context("Failed to replay WAL")?;
    let replayed = operations.len();
    apply_wal_operations(&state, operations);

    info!(
        operations_replayed = replayed,
        users_loaded = state.store.user_count(),
        checked_in = state.store.open_count(),
        "WAL replay completed"
    );

    let seeded = seed_locations(&state).context("Failed to seed locations")?;
    info!(
        seeded,
        locations = state.store.locations().len(),
        "Locations ready"
    );

    spawn_session_sweep(
        Arc::clone(&state.sessions),
        Arc::clone(&state.waivers),
        config.admin.sweep_interval_secs,
    );
    info!(
        sweep_interval_seconds = config.admin.sweep_interval_secs,
        session_ttl_seconds = config.admin.session_ttl_secs,
        "Admin session sweep started"
    );

    let app = build_router(Arc::new(state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    info!(address = %addr, "Starting TCP listener");

    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind TCP listener to {}", addr))?;

    info!(address = %addr, "Check-in service startup complete");

    serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("TCP server error")?;

    info!("Shutting down gracefully");

    Ok(())
}

/// Spawn a background task that periodically drops expired admin sessions
fn spawn_session_sweep(sessions: Arc<SessionStore>, waivers: Arc<PendingWaivers>, sweep_interval: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));

        loop {
            interval.tick().await;

            let removed = sessions.sweep(now_millis());
            if removed > 0 {
                info!(removed_sessions = removed, active_sessions = sessions.len(), "Session sweep completed");
            } else {
                debug!("Session sweep completed, no expired sessions");
            }

            let expired = waivers.sweep(now_millis());
            if expired > 0 {
                debug!(expired_waivers = expired, pending_waivers = waivers.len(), "Dropped stale waiver requests");
            }
        }
    });
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
