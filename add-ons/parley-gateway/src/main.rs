//! Parley Gateway binary. Bind address: `PARLEY_GATEWAY_ADDR` (default `127.0.0.1:8888`).

use anyhow::Context;
use parley_gateway::{build_app, AppState};
use parley_voice::{backend_from_config, OpenAiChat, PipelineConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "127.0.0.1:8888";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[parley-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::load().context("loading pipeline configuration")?;
    let chat = Arc::new(OpenAiChat::new(&config.chat).context("building chat client")?);
    let synth = backend_from_config(&config.synthesis).context("building synthesis client")?;
    let state = AppState {
        chat,
        synth,
        config: Arc::new(config),
    };

    let addr: SocketAddr = std::env::var("PARLEY_GATEWAY_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("PARLEY_GATEWAY_ADDR must be host:port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(target: "parley::gateway", "parley-gateway listening on {}", addr);

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target: "parley::gateway", "shutdown requested (Ctrl+C)");
        })
        .await?;
    Ok(())
}
