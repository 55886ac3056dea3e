//! Operator UI server - starts runs and streams their snapshots to a browser.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use operator::io::config::{DEFAULT_CONFIG_PATH, load_config};
use operator::session_loop::Clients;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::{AppState, DEFAULT_MAX_RUNS};

#[derive(Parser)]
#[command(name = "operator-ui")]
#[command(about = "Web API for starting operator runs and watching them live")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Operator config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Finished runs kept in memory before the oldest are dropped
    #[arg(long, default_value_t = DEFAULT_MAX_RUNS)]
    max_runs: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("operator_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let cfg = load_config(&args.config)?;
    info!(base_url = %cfg.api.base_url, "starting operator-ui");

    let state =
        AppState::new(Clients::http(&cfg)?, cfg.state.clone()).with_max_runs(args.max_runs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
