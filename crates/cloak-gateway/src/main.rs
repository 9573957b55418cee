use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod ai;
mod app;
mod auth;
mod handlers;
mod http;
mod listeners;
mod sync;
mod ws;

#[derive(Parser, Debug)]
#[command(name = "cloak-gateway", about = "Realtime sync and AI-dispatch gateway")]
struct Args {
    /// Path to cloak.toml (defaults to ~/.cloak/cloak.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override the bind address from config.
    #[arg(long)]
    bind: Option<String>,

    /// Override the port from config.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloak_gateway=info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = cloak_core::config::CloakConfig::load(args.config.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            cloak_core::config::CloakConfig::default()
        });
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::build(config).await?);
    listeners::spawn_all(&state);

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("cloak gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
