//! Helpdesk API Server

use std::sync::Arc;

use anyhow::Context;
use helpdesk_api::{
    bootstrap,
    config::{Config, LogFormat, StorageBackend},
    create_router, AppState,
};
use helpdesk_shared::{create_pool, run_migrations, HelpdeskStore, MemoryStore, PgStore};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "helpdesk_api=info,helpdesk_shared=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let env_loaded = dotenvy::dotenv().is_ok();

    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);
    if env_loaded {
        tracing::info!("Loaded .env file");
    }

    let store: Arc<dyn HelpdeskStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = create_pool(url, config.database_max_connections)
                .await
                .context("failed to connect to the database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(admin) = &config.bootstrap_admin {
        bootstrap::ensure_admin(store.as_ref(), admin)
            .await
            .context("failed to create bootstrap admin")?;
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, store);
    let hub = Arc::clone(&state.hub);
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Helpdesk API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams never finish on their own
            let closed = hub.close_all();
            tracing::info!(closed_streams = closed, "Shutting down");
        })
        .await?;

    Ok(())
}
