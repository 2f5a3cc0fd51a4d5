//! Tollgate entitlement server
//!
//! Serves the HTTP API for authentication, revalidation and license
//! administration, and a TCP hub that pushes entitlement events to
//! subscribed clients.
//!
//! Usage:
//!   tollgate-server --database tollgate.db --admin-key $KEY
//!
//! Without `--database` the server keeps licenses in memory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ed25519_dalek::{SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::{fs, path::Path, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tollgate_credential::CredentialCodec;
use tollgate_server::{maintenance, serve_http, serve_hub, AppState, ServerConfig};
use tollgate_store::{LicenseBackend, MemoryBackend, SqliteBackend, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tollgate-server")]
#[command(about = "Tollgate entitlement server")]
struct Args {
    /// Address to bind both listeners to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// HTTP API port
    #[arg(long, default_value = "8420")]
    http_port: u16,

    /// Hub (TCP push) port
    #[arg(long, default_value = "8421")]
    hub_port: u16,

    /// SQLite database file; licenses are kept in memory when omitted
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to the Ed25519 signing key, generated on first start
    #[arg(long, default_value = "tollgate-signing.key")]
    signing_key: PathBuf,

    /// Previous signing keys whose tokens are still accepted
    #[arg(long)]
    previous_key: Vec<PathBuf>,

    /// Key required in the x-admin-key header
    #[arg(long, env = "TOLLGATE_ADMIN_KEY", hide_env_values = true)]
    admin_key: String,

    /// JSON config file for guard, origin and hub settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Tollgate server starting...");
    if args.admin_key.len() < 16 {
        bail!("admin key must be at least 16 characters");
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    let signing_key = load_or_generate_signing_key(&args.signing_key)?;
    let mut codec = CredentialCodec::new(signing_key);
    for path in &args.previous_key {
        let previous = load_signing_key(path)?;
        codec = codec.accepting(previous.verifying_key());
        info!("Accepting tokens from previous key {:?}", path);
    }
    if let Some(kid) = codec.signing_key_id() {
        info!("Signing key id: {}", kid);
    }

    let backend: Arc<dyn LicenseBackend> = match &args.database {
        Some(path) => {
            info!("Opening database {:?}", path);
            Arc::new(SqliteBackend::open(path).context("Failed to open database")?)
        }
        None => {
            warn!("No --database given; licenses are kept in memory only");
            Arc::new(MemoryBackend::new())
        }
    };

    let maintenance_interval = config.maintenance_interval();
    let state = AppState::assemble(
        backend,
        codec,
        StoreConfig::default(),
        config,
        args.admin_key.clone(),
    );

    let http = TcpListener::bind((args.bind.as_str(), args.http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.http_port))?;
    let hub = TcpListener::bind((args.bind.as_str(), args.hub_port))
        .await
        .with_context(|| format!("Failed to bind hub port {}", args.hub_port))?;

    let sweeper = maintenance::spawn(state.clone(), maintenance_interval);
    let hub_task = tokio::spawn(serve_hub(hub, state.clone()));

    println!("\n========================================");
    println!("  Tollgate Server Running");
    println!("========================================");
    println!("  HTTP Port: {}", args.http_port);
    println!("  Hub Port:  {}", args.hub_port);
    println!("========================================\n");

    let result = tokio::select! {
        result = serve_http(http, state) => result.context("HTTP server failed"),
        result = hub_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Hub listener failed")),
            Err(e) => Err(anyhow::Error::new(e).context("Hub task panicked")),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };
    sweeper.abort();
    result
}

fn load_config(path: &Path) -> Result<ServerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config file {:?}", path))
}

fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read signing key {:?}", path))?;
    let secret: [u8; SECRET_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .with_context(|| format!("Signing key {:?} must be {} bytes", path, SECRET_KEY_LENGTH))?;
    Ok(SigningKey::from_bytes(&secret))
}

fn load_or_generate_signing_key(path: &Path) -> Result<SigningKey> {
    if path.exists() {
        info!("Loading signing key from {:?}", path);
        load_signing_key(path)
    } else {
        info!("Generating new signing key at {:?}", path);
        let key = SigningKey::generate(&mut OsRng);
        fs::write(path, key.to_bytes()).context("Failed to write signing key")?;
        Ok(key)
    }
}
