//! Process supervisor: reads configuration, starts the enabled provider
//! listeners, and waits for a termination signal.
//!
//! `#[tokio::main]`, bootstrap then bind-and-serve, generalized from one
//! listener to one-per-provider plus the OpenAI-hosted management endpoint,
//! with an explicit signal-driven shutdown rather than relying on the
//! container runtime to `kill -9` the process.

use std::sync::Arc;

use awf_common::ProviderID;
use awf_core::bootstrap::{bootstrap, CliArgs, ANTHROPIC_PORT, COPILOT_PORT, OPENAI_PORT};
use awf_core::listener::{openai_router, provider_router};
use clap::Parser;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    awf_logger::init();

    let args = CliArgs::parse();
    let core = bootstrap(&args);

    tracing::info!(event = "startup");

    let mut tasks = Vec::new();

    let openai_listener = TcpListener::bind(("127.0.0.1", OPENAI_PORT)).await?;
    let openai_app = openai_router(Arc::clone(&core));
    tracing::info!(event = "server_start", provider = "openai", port = OPENAI_PORT);
    tasks.push(tokio::spawn(async move {
        let _ = axum::serve(openai_listener, openai_app).await;
    }));

    if core.provider(ProviderID::Anthropic).enabled() {
        let listener = TcpListener::bind(("127.0.0.1", ANTHROPIC_PORT)).await?;
        let app = provider_router(Arc::clone(&core), ProviderID::Anthropic);
        tracing::info!(event = "server_start", provider = "anthropic", port = ANTHROPIC_PORT);
        tasks.push(tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        }));
    }

    if core.provider(ProviderID::Copilot).enabled() {
        let listener = TcpListener::bind(("127.0.0.1", COPILOT_PORT)).await?;
        let app = provider_router(Arc::clone(&core), ProviderID::Copilot);
        tracing::info!(event = "server_start", provider = "copilot", port = COPILOT_PORT);
        tasks.push(tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!(event = "shutdown");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}
