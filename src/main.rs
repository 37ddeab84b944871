// src/main.rs
//! Fraud Stream Server Entry Point
//! This binary starts the pending transaction monitor and the streaming server.
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use eth_fraud_stream::anomaly_detection::ClassifierArtifact;
use eth_fraud_stream::config::{env_config, ServiceConfig};
use eth_fraud_stream::service::FraudStreamService;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "fraud_stream")]
#[command(about = "Ethereum pending transaction fraud stream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor pending transactions and serve the classification stream
    Serve(ServeArgs),
    /// Load a classifier artifact and print its trained feature order
    CheckArtifact {
        /// Path to the artifact JSON file
        #[arg(long)]
        path: PathBuf,
    },
}

#[derive(ClapArgs, Default)]
struct ServeArgs {
    /// Config file (defaults to CONFIG_PATH or config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind the server to
    #[arg(long)]
    host: Option<String>,
    /// Port to bind the server to
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging()?;

    match args.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(serve_args) => serve(serve_args).await,
        Commands::CheckArtifact { path } => check_artifact(path),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting Fraud Stream v{}", env!("CARGO_PKG_VERSION"));

    let path = args.config.unwrap_or_else(env_config::config_path);
    let mut config = ServiceConfig::load(&path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let service = FraudStreamService::build(config).await?;

    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.cancel();
    });

    service.run().await?;
    info!("Fraud Stream stopped");
    Ok(())
}

fn check_artifact(path: PathBuf) -> Result<()> {
    let artifact = ClassifierArtifact::load(&path)?;
    println!("Model: {}", artifact.model_name());
    println!("Features ({}):", artifact.feature_order().len());
    for (index, name) in artifact.feature_order().iter().enumerate() {
        println!("  {:>2}. {}", index + 1, name);
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
