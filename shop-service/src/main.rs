use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shop_service::config::{Config, LogFormat};
use shop_service::{api, db};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for SIGINT: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    if config.skip_migrations {
        info!("Skipping database migrations");
    } else {
        let database_url = config.database_url.clone();
        tokio::task::spawn_blocking(move || db::run_migrations(&database_url)).await??;
    }

    let pool = db::build_pool(&config.database_url, config.pool_size).await?;
    let shop = shop_service::postgres_orchestrator(pool, &config);

    let app = api::create_router(api::AppState {
        shop: Arc::new(shop),
    });
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;

    info!("Shop service started on {}", config.addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shop service shut down");
    Ok(())
}
