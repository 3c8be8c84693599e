//! Offline training CLI.
//!
//! Runs the same training as `GET /train` and prints one progress line per
//! pass.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use companion_core::DEFAULT_CONFIG_PATH;
use companion_trainer::run_training;

#[derive(Parser)]
#[command(name = "companion-train")]
#[command(about = "Train an entity recognition model from a training config")]
#[command(version)]
struct Cli {
    /// Training configuration file
    #[arg(short, long, env = "COMPANION_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory that receives `model-<version>`
    #[arg(short, long, env = "COMPANION_MODEL_ROOT", default_value = "/mnt")]
    model_root: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let out = run_training(&cli.config, &cli.model_root, |progress| {
        println!("{progress}");
    })?;
    println!("saved model to {}", out.display());
    Ok(())
}
