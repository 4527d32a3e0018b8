//! Conclave Gateway Binary
//!
//! # Usage
//! ```bash
//! conclave-gateway [--config conclave.toml] [--port 18790] [--host 127.0.0.1] [--verbose]
//! ```

use anyhow::Context;
use clap::Parser;
use conclave_gateway::{Gateway, GatewayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Conclave Gateway - expert coordination
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = "CONCLAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(args.verbose)
        .init();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .apply_env()?;
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    let gateway = Arc::new(Gateway::new(config)?);
    print_banner(&gateway);

    let signal_gateway = gateway.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_gateway.shutdown();
        }
    });

    gateway.serve().await?;
    Ok(())
}

fn print_banner(gateway: &Gateway) {
    let config = gateway.config();
    println!();
    println!("Conclave Gateway v{}", conclave_gateway::VERSION);
    println!("   └─ http://{}:{}", config.server.host, config.server.port);
    println!();
    println!("Experts ({})", gateway.registry().len());
    for id in gateway.registry().ids() {
        println!("   ├─ {}", id);
    }
    println!();
    println!("Press Ctrl+C to stop the gateway");
    println!();
}
