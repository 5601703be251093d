#![forbid(unsafe_code)]

//! **toolhost-cli** – command-line entry point for the tool host.
//!
//! Installs tools into the registry, or runs an HTTP host process in
//! either standalone mode (owns and executes tools directly) or broker
//! mode (aggregates other host processes registered with it).

mod host_config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolhost_broker::Broker;
use toolhost_executor::Executor;
use toolhost_filestore::{FileStore, OutputRefManager};
use toolhost_provisioner::{Provisioner, VenvProvisioner};
use toolhost_registry::ToolRegistry;
use toolhost_server::{AppState, HostMode};

#[derive(Parser)]
#[command(name = "toolhost")]
#[command(about = "Tool host: install tools, and serve them over HTTP")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Base directory the default tools/envs/run/uploads/outputs/blobs
    /// subdirectories are rooted under
    #[arg(long)]
    base_dir: Option<String>,

    /// Bearer token required on every request; overrides the config file
    #[arg(long, env = "TOOLHOST_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a tool from a local directory reference or a remote
    /// source URL
    Install {
        /// Local path or remote source reference
        source: String,
    },
    /// Scan the tools root and print every installed tool's summary
    List,
    /// Run the HTTP host process
    Serve {
        /// Port the HTTP server listens on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Run as a broker that aggregates other host processes instead
        /// of owning tools directly
        #[arg(long)]
        broker: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let host_config = host_config::load(
        &cli.config,
        host_config::Overrides { base_dir: cli.base_dir.clone(), auth_token: cli.auth_token.clone() },
    )?;

    match cli.command {
        Commands::Install { source } => install(&host_config, &source).await,
        Commands::List => list(&host_config).await,
        Commands::Serve { port, broker } => serve(host_config, port, broker).await,
    }
}

fn provisioner(host_config: &toolhost_types::HostConfig) -> Arc<dyn Provisioner> {
    Arc::new(VenvProvisioner::new(host_config.envs_root.clone()))
}

async fn install(host_config: &toolhost_types::HostConfig, source: &str) -> Result<()> {
    let registry = ToolRegistry::new(host_config.tools_root.clone(), provisioner(host_config));
    let summary = registry.install(source).await.with_context(|| format!("failed to install '{source}'"))?;
    println!("installed {} v{} ({} methods)", summary.name, summary.version, summary.methods.len());
    Ok(())
}

async fn list(host_config: &toolhost_types::HostConfig) -> Result<()> {
    let registry = ToolRegistry::new(host_config.tools_root.clone(), provisioner(host_config));
    let loaded = registry.scan().await.context("failed to scan tools root")?;
    info!(loaded, "scan complete");

    for tool in registry.list_summaries().await {
        println!("{}\t{}\t{:?}\t{:?}", tool.name, tool.version, tool.mode, tool.status);
    }
    Ok(())
}

async fn serve(host_config: toolhost_types::HostConfig, port: u16, broker_mode: bool) -> Result<()> {
    let filestore = Arc::new(
        FileStore::open(&host_config.files_db_path, host_config.blobs_root.clone())
            .await
            .context("failed to open file store")?,
    );
    let output_refs = Arc::new(OutputRefManager::new(host_config.outputs_root.clone()));
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let filestore = filestore.clone();
        let shutdown = shutdown.clone();
        async move { filestore.run_gc(shutdown).await }
    });

    let mut standalone_executor: Option<Arc<Executor>> = None;

    let mode = if broker_mode {
        info!("starting in broker mode");
        let broker = Arc::new(Broker::new());
        tokio::spawn({
            let broker = broker.clone();
            let shutdown = shutdown.clone();
            async move { broker.run_cleanup(shutdown).await }
        });
        HostMode::Broker { broker }
    } else {
        info!(tools_root = %host_config.tools_root.display(), "starting in standalone mode");
        let registry = Arc::new(ToolRegistry::new(host_config.tools_root.clone(), provisioner(&host_config)));
        let loaded = registry.scan().await.context("failed to scan tools root")?;
        info!(loaded, "scan complete");
        let executor = Arc::new(Executor::new(registry.clone()));
        standalone_executor = Some(executor.clone());
        HostMode::Standalone { registry, executor }
    };

    let state = AppState {
        mode,
        filestore: Some(filestore),
        output_refs: Some(output_refs),
        auth_token: host_config.auth_token.clone(),
        outputs_url_base: "/v1/files".to_string(),
        uploads_root: host_config.uploads_root.clone(),
    };

    let app = toolhost_server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await.with_context(|| format!("failed to bind to port {port}"))?;
    info!(port, "HTTP server listening");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>());

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                error!(error = %err, "HTTP server error");
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    shutdown.cancel();
    if let Some(executor) = standalone_executor {
        executor.close().await;
    }
    info!("tool host stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let _ = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).try_init();
}
