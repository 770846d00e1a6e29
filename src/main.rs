use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use iot_message_api::app::{router, AppState};
use iot_message_api::auth::IdentityPlatformVerifier;
use iot_message_api::config::AppConfig;
use iot_message_api::database::{DatabaseManager, DatabaseProvider};
use iot_message_api::services::{HttpAccessResolver, MessageService};

#[derive(Parser)]
#[command(name = "iot-message-api")]
#[command(about = "Read API for IoT device messages stored in MongoDB or Firestore")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Port to listen on (overrides PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Message store: mongo, mongodb or firestore (overrides DATABASE_PROVIDER)")]
    provider: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DB_URI_MESSAGE_MNG, AUTH_API_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(provider) = cli.provider {
        config.database.provider = provider;
    }
    tracing::info!("Starting IoT message API in {:?} mode", config.environment);

    let provider: DatabaseProvider = config.database.provider.parse()?;
    let timeout = Duration::from_secs(config.upstream.timeout_secs);

    let store = DatabaseManager::connect(provider, &config.database, timeout)
        .await
        .with_context(|| format!("failed to connect to the {} message store", provider))?;

    if config.auth.api_key.is_empty() {
        tracing::warn!("AUTH_API_KEY is empty; identity verification will be rejected upstream");
    }
    let verifier = IdentityPlatformVerifier::new(&config.auth.identity_lookup_url, &config.auth.api_key, timeout)?;
    let access = HttpAccessResolver::new(&config.upstream.mqtt_service_url, timeout)?;

    let state = AppState {
        service: Arc::new(MessageService::new(store, Arc::new(access), config.filter.max_limit)),
        verifier: Arc::new(verifier),
        audience: config.auth.audience.clone(),
    };
    let app = router(state, &config.server.cors_origins);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("IoT message API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
