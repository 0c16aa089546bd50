//! # Voicemail Bridge
//!
//! HTTP service hosting the voicemail pipeline. Each trigger posts its event to
//! one route and every request is one invocation:
//!
//! - `POST /api/v1/events/voicemail-audio`: queue batch of call records; pulls each
//!   voicemail's audio from the media stream and publishes a WAV recording
//! - `POST /api/v1/events/voicemail-recording`: recording created; starts transcription
//! - `POST /api/v1/events/voicemail-transcript`: transcript created; updates the
//!   CRM call record, posts the transcript and routes the call
//!
//! ## Application layout:
//! - **audio**: container demuxing, fragment boundaries, PCM re-encoding
//! - **media**: remote media stream transport and the fragment reader
//! - **storage**: object store seam, key layout, tag strings
//! - **integration** / **transcription**: outbound collaborators
//! - **voicemail**: the three handlers
//! - **config**, **state**, **health**, **middleware**, **handlers**, **error**: service plumbing

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod integration;
mod media;
mod middleware;
mod state;
mod storage;
mod transcription;
mod voicemail;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        bucket = %config.storage.recordings_bucket,
        store_root = %config.storage.root_dir,
        "Configuration loaded"
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    // In-flight audio pulls may run up to the pull cap; let them finish on shutdown.
    let shutdown_timeout = config.media.max_pull_secs;
    let app_state = web::Data::new(AppState::new(config)?);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(4 * 1024 * 1024))
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::InvocationLogging)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .service(
                        web::scope("/events")
                            .route("/voicemail-audio", web::post().to(handlers::voicemail_audio))
                            .route("/voicemail-recording", web::post().to(handlers::voicemail_recording))
                            .route("/voicemail-transcript", web::post().to(handlers::voicemail_transcript)),
                    ),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .disable_signals()
    .shutdown_timeout(shutdown_timeout)
    .bind(&bind_addr)?
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

/// `RUST_LOG` controls filtering; defaults to `voicemail_bridge=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicemail_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (term, int) => {
            let failure = term.err().or(int.err()).map(|e| e.to_string()).unwrap_or_default();
            warn!(error = %failure, "Could not install signal handlers; falling back to Ctrl+C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Ctrl+C handler failed: {}", e);
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Ctrl+C handler failed: {}", e);
        std::future::pending::<()>().await;
    }
}
