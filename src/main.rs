//! # Medical Consultation Backend
//!
//! HTTP service that turns a consultation (typed notes or an audio recording)
//! into structured patient information and a diagnosis draft, by chaining a
//! speech-to-text provider and a language model.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **providers**: clients for the audio source, transcription and completion APIs
//! - **pipeline**: transcription, extraction and diagnosis steps plus the orchestrator
//! - **middleware**: the per-endpoint chain (CORS, analytics, validation, rate
//!   limiting, error handling) and app-wide HTTP metrics
//! - **handlers**: routes, pipeline endpoints and the browser client page
//! - **health**: health and metrics endpoints
//! - **state**: shared application state
//! - **error**: error types and their HTTP classification

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod models;
mod pipeline;
mod providers;
mod state;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::pipeline::ConsultationPipeline;
use crate::providers::{audio::HttpAudioSource, openai::OpenAiClient};
use crate::state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    if config.providers.api_key.is_none() {
        warn!("No provider API key configured (set OPENAI_API_KEY); pipeline calls will fail");
    }

    let app_state = build_state(config.clone())?;
    let bind_addr = config.bind_address();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Wire the providers into the pipeline and wrap everything in the shared state.
fn build_state(config: AppConfig) -> Result<AppState> {
    let client = reqwest::Client::builder()
        .timeout(config.provider_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let openai = Arc::new(OpenAiClient::new(client.clone(), &config.providers));
    let audio = Arc::new(HttpAudioSource::new(client));

    let pipeline = ConsultationPipeline::new(audio, openai.clone(), openai, &config);
    Ok(AppState::new(config, pipeline))
}

/// `RUST_LOG` wins when set; otherwise debug for this crate, info for actix.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medical_consultation_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to initialize tracing")?;

    Ok(())
}

/// Resolves on SIGTERM or SIGINT. If the Unix handlers cannot be installed,
/// falls back to Ctrl+C.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
