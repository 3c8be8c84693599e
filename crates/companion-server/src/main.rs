use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use companion_core::DEFAULT_CONFIG_PATH;
use companion_server::{AppState, router};

#[derive(Parser)]
#[command(name = "companion-server")]
#[command(about = "Serve entity predictions and train models over HTTP")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "COMPANION_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Training configuration file
    #[arg(short, long, env = "COMPANION_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory holding `model-<version>` directories
    #[arg(short, long, env = "COMPANION_MODEL_ROOT", default_value = "/mnt")]
    model_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = Arc::new(AppState::new(cli.config, cli.model_root));

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!(
        addr = %cli.bind,
        config = %state.config_path().display(),
        model_root = %state.model_root().display(),
        "listening"
    );

    axum::serve(listener, router(state))
        .await
        .context("server stopped")?;
    Ok(())
}
