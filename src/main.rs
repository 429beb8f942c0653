//! Process entry point: parse CLI args, load configuration, load optional
//! seed documents, spawn the engine task, and serve HTTP and gRPC
//! concurrently until one of them fails or the process is signalled.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use semnet_engine::config::AppConfig;
use semnet_engine::engine::EngineHandle;
use semnet_engine::service::grpc::{pb::semnet_server::SemnetServer, SemnetService};
use semnet_engine::service::{http, AppState};
use semnet_engine::shapes::ShapeCatalog;

#[derive(Parser, Debug)]
#[command(name = "semnetd", about = "Knowledge-graph inference service")]
struct Cli {
    /// Path to a YAML config file overlaying the compiled defaults.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the HTTP listen port.
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the gRPC listen port.
    #[arg(long)]
    rpc_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.http_port {
        config.http_port = port;
    }
    if let Some(port) = cli.rpc_port {
        config.rpc_port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let shapes = match &config.shapes_path {
        Some(path) => match ShapeCatalog::load_str(
            &std::fs::read_to_string(path).unwrap_or_default(),
            path.extension().and_then(|e| e.to_str()) == Some("json"),
        ) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("fatal: failed to load shape catalog from {path:?}: {e}");
                std::process::exit(1);
            }
        },
        None => ShapeCatalog::empty(),
    };

    let engine = EngineHandle::spawn(config.max_facts, shapes);

    if let Some(path) = &config.seed_rules_path {
        match semnet_engine::seed::load_seed_rules(&engine, path).await {
            Ok(report) => tracing::info!(loaded = report.loaded_rule_count, rejected = report.rejected.len(), "loaded seed rules"),
            Err(e) => {
                eprintln!("fatal: failed to load seed rules from {path:?}: {e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(path) = &config.seed_kb_path {
        match semnet_engine::seed::load_seed_facts(&engine, path).await {
            Ok(count) => tracing::info!(count, "loaded seed facts"),
            Err(e) => {
                eprintln!("fatal: failed to load seed facts from {path:?}: {e}");
                std::process::exit(1);
            }
        }
    }

    let state = AppState { engine, config: Arc::new(config) };

    let http_addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let rpc_addr = SocketAddr::from(([0, 0, 0, 0], state.config.rpc_port));

    let http_app = http::router(state.clone());
    let http_server = async move {
        let listener = match tokio::net::TcpListener::bind(http_addr).await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("fatal: failed to bind HTTP listener on {http_addr}: {e}");
                std::process::exit(1);
            }
        };
        tracing::info!(%http_addr, "HTTP bridge listening");
        if let Err(e) = axum::serve(listener, http_app).await {
            eprintln!("fatal: HTTP server error: {e}");
            std::process::exit(2);
        }
    };

    let grpc_service = SemnetService::new(state.clone());
    let grpc_server = async move {
        tracing::info!(%rpc_addr, "gRPC bridge listening");
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(SemnetServer::new(grpc_service))
            .serve(rpc_addr)
            .await
        {
            eprintln!("fatal: gRPC server error: {e}");
            std::process::exit(2);
        }
    };

    tokio::join!(http_server, grpc_server);
}
