use std::env;
use std::sync::Arc;

use clap::Parser;
use electric_core::Collaborators;
use electric_server::auth::StaticTokenAuthVerifier;
use electric_server::cli::Cli;
use electric_server::collaborators::{
    EmptySubscriptionDataSource, PassthroughMigrationTranslator, StaticSchemaCache, StaticWalSource,
};
use electric_server::config;
use electric_server::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let cli = Cli::parse();
    let mut cfg = config::load_config_from_path(&cli.config).expect("failed to load config");
    if let Some(bind) = cli.bind {
        cfg.server.bind = bind;
    }

    let collaborators = Collaborators {
        auth: Arc::new(StaticTokenAuthVerifier::new(cfg.auth.tokens.clone())),
        wal: Arc::new(StaticWalSource::new(vec![0], vec![0])),
        schema_cache: Arc::new(StaticSchemaCache::default()),
        translator: Arc::new(PassthroughMigrationTranslator),
        subscription_data: Arc::new(EmptySubscriptionDataSource::new(vec![0])),
    };

    let state = AppState::new(collaborators);
    let router = electric_server::build_router(state, &cfg.server.ws_path);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .expect("failed to bind");
    info!(addr = %cfg.server.bind, "electric-server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
