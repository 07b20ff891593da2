//! ORAC STT service entry point — the composition root.
//!
//! Parses arguments, layers the YAML config with environment and CLI
//! overrides, initializes tracing, and hands off to the axum adapter. The
//! process exits non-zero when a supervised engine cannot be brought up,
//! so a container orchestrator restarts the whole pod.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::FileConfig;

/// ORAC STT — speech-to-text ingest and routing service.
#[derive(Parser, Debug)]
#[command(name = "orac-stt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the HTTP server to.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for persistent state (topics, settings, pidfile).
    #[arg(short, long, env = "ORAC_STT_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Default downstream ORAC Core URL.
    #[arg(long, env = "ORAC_CORE_URL")]
    core_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ORAC STT");

    let file_config = FileConfig::load(args.config.as_deref())?;
    let mut server_config = file_config.into_server_config(args.data_dir);

    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(core_url) = args.core_url {
        server_config.default_core_url = core_url;
    }

    orac_stt_axum::start_server(server_config).await
}
