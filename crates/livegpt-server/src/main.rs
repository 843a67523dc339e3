//! LiveGPT server binary.
//!
//! Starts the lobby HTTP surface with structured logging, process-scoped
//! provider clients, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use livegpt_agent::room::local::{LocalConnector, LocalSfu};
use livegpt_agent::Providers;
use livegpt_llm::OpenAiClient;
use livegpt_server::{app, AppState, Config, LiveKitDirectory, Supervisor};
use livegpt_voice::stt::google::GoogleSttClient;
use livegpt_voice::{GoogleSynthesizer, ServiceAccountKey, TokenProvider};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::load()
        .expect("failed to load configuration — set LIVEGPT_CONFIG_FILE or LIVEGPT_CONFIG_BODY");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if config.openai_api_key.is_empty() {
        panic!("OPENAI_API_KEY is not set — configure openai_api_key or the environment variable");
    }

    let google_key = ServiceAccountKey::from_env()
        .expect("invalid Google credentials")
        .expect(
            "Google credentials are required — set GOOGLE_APPLICATION_CREDENTIALS or \
             GOOGLE_APPLICATION_CREDENTIALS_BODY",
        );
    let google_auth = Arc::new(TokenProvider::new(google_key));

    let providers = Providers {
        stt: Arc::new(
            GoogleSttClient::new(google_auth.clone())
                .expect("failed to build the speech client"),
        ),
        tts: Arc::new(GoogleSynthesizer::new(google_auth)),
        llm: Arc::new(OpenAiClient::new(config.openai_api_key.clone())),
    };

    // The realtime half of the SFU is reached through the RoomConnector
    // seam; this binary wires the in-process implementation, which is
    // what the integration suite and the dev loop run against. A
    // deployment substitutes its SFU SDK binding here.
    let connector = Arc::new(LocalConnector::new(LocalSfu::new()));

    let directory = Arc::new(LiveKitDirectory::new(
        &config.livekit.url,
        &config.livekit.api_key,
        &config.livekit.secret_key,
    ));

    let supervisor = Supervisor::new(config.clone(), providers, connector, directory);
    let state = Arc::new(AppState {
        supervisor: supervisor.clone(),
        api_key: config.livekit.api_key.clone(),
        api_secret: config.livekit.secret_key.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "starting livegpt server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    supervisor.shutdown().await;
    tracing::info!("livegpt server shut down");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
