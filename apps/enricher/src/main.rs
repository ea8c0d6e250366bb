mod cli;
mod config;
mod enrichment;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Generate(args) => cli::run_generate(args, &config).await,
        Command::Validate(args) => cli::run_validate(&args),
        Command::ListPrompts => {
            cli::run_list_prompts();
            Ok(())
        }
        Command::StructurePrevious(args) => cli::run_structure_previous(&args),
        Command::Serve(args) => serve(config, args.port).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    info!("Starting NCOER enricher API v{}", env!("CARGO_PKG_VERSION"));

    let port = port.unwrap_or(config.port);
    let state = AppState { config };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
