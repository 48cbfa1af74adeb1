mod config;
mod error;
mod handlers;
mod http;
mod rotation;
mod server;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sealbox_keyring::KeyManager;
use sealbox_kms::{KmsAdapter, LocalKms, RemoteKms, RemoteKmsConfig};
use sealbox_store_sqlite::SqliteStore;

use config::{Config, KmsSettings, DEV_KEK_ID};
use rotation::{RotationQueue, DEFAULT_QUEUE_DEPTH, DEFAULT_WORKERS};
use server::SealboxServer;

#[derive(Parser)]
#[command(name = "sealbox-server")]
#[command(about = "Envelope-encrypted secret store")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db or sqlite::memory:)
    #[arg(
        long,
        global = true,
        env = "SEALBOX_DATABASE_URL",
        default_value = "sqlite://sealbox.db"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Listen address
        #[arg(long, env = "SEALBOX_LISTEN_ADDR", default_value = "0.0.0.0:8200")]
        addr: String,
    },
}

fn build_kms(settings: &KmsSettings) -> anyhow::Result<Arc<dyn KmsAdapter>> {
    match settings {
        KmsSettings::Dev { kek } => {
            info!("KMS: development mode with locally-held KEK");
            Ok(Arc::new(LocalKms::new(DEV_KEK_ID, kek)?))
        }
        KmsSettings::Remote {
            endpoint,
            project,
            location,
            key_ring,
            key,
            timeout,
        } => {
            info!(endpoint, key, "KMS: remote mode");
            Ok(Arc::new(RemoteKms::new(RemoteKmsConfig {
                endpoint: endpoint.clone(),
                project: project.clone(),
                location: location.clone(),
                key_ring: key_ring.clone(),
                key: key.clone(),
                timeout: *timeout,
            })?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { addr } => serve(&cli.database_url, &addr).await,
    }
}

/// Startup order is load-bearing: configuration, durable store, KMS, DEK
/// cache, default DEK, then traffic. A failure in any step before the
/// listener aborts with a non-zero exit code.
async fn serve(database_url: &str, addr: &str) -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    let store = Arc::new(
        SqliteStore::open(database_url)
            .await
            .context("opening durable store")?,
    );

    let kms = build_kms(&config.kms)?;

    let keys = Arc::new(KeyManager::new(store.clone(), kms));
    keys.load().await.context("populating DEK cache")?;

    let tokens = sealbox_auth::TokenSigner::new(&config.signing_key, config.token_ttl_secs);
    let rotation = RotationQueue::start(
        store.clone(),
        keys.clone(),
        DEFAULT_WORKERS,
        DEFAULT_QUEUE_DEPTH,
    );

    let server = Arc::new(SealboxServer::new(store, keys, tokens, rotation));
    server.bootstrap(&config).await.context("bootstrap")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr, "sealbox listening");

    axum::serve(listener, http::router(server))
        .await
        .context("serving")?;

    Ok(())
}
