//! Otterly Gateway binary.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use otterly_gateway::adapters::{
    app_router, ConnectionLimits, GatewayState, GeminiConfig, GeminiDialogueClient,
};
use otterly_gateway::config::{AppConfig, ConfigError, ValidationError};
use otterly_gateway::domain::gateway::{CredentialValidator, CLOSE_GOING_AWAY};
use otterly_gateway::ports::{DialogueClient, DialogueError};

/// How long live sessions get to acknowledge the shutdown close frame.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error("failed to build Gemini client: {0}")]
    Upstream(#[from] DialogueError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let loaded = AppConfig::load().and_then(|config| {
        config.validate()?;
        Ok::<_, ConfigError>(config)
    });

    let (log_level, json) = match &loaded {
        Ok(config) => (config.server.log_level.clone(), config.is_production()),
        Err(_) => ("info".to_string(), false),
    };
    init_tracing(&log_level, json);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway stopped with error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let gemini = GeminiConfig::new(config.gemini_credential()?)
        .with_model(config.gemini.model.clone())
        .with_base_url(config.gemini.base_url.clone())
        .with_timeout(config.gemini.timeout());
    let dialogue: Arc<dyn DialogueClient> = Arc::new(GeminiDialogueClient::new(gemini)?);
    let info = dialogue.client_info();

    let limits = ConnectionLimits {
        idle_timeout: config.websocket.idle_timeout(),
        max_payload_bytes: config.websocket.max_payload_bytes,
        outbound_buffer: config.websocket.outbound_buffer,
    };
    let credentials = CredentialValidator::new(config.gateway_credential()?);
    let state = GatewayState::new(dialogue, credentials, limits);
    let registry = state.registry.clone();
    let app = app_router(state, &config.server.cors_origins_list());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        client = %info.name,
        model = %info.model,
        idle_timeout_secs = limits.idle_timeout.as_secs(),
        max_payload_bytes = limits.max_payload_bytes,
        "Otterly gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Upgraded sockets outlive `serve`; close them explicitly.
    let closing = registry
        .close_all(CLOSE_GOING_AWAY, "Server shutting down")
        .await;
    if closing > 0 {
        let remaining = registry.wait_until_empty(SHUTDOWN_GRACE).await;
        tracing::info!(closing, remaining, "Closed live sessions");
    }

    tracing::info!("Gateway shut down");
    Ok(())
}

/// Completes on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
