//! Binary entry point: wires configuration, logging, the backend provider,
//! the in-flight registry, and the HTTP server together, with graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use antwort_gateway::backend::{HttpProvider, Provider};
use antwort_gateway::config::{Cli, Settings};
use antwort_gateway::store::InMemoryResponseStore;
use antwort_gateway::{AuthDecision, Authenticator, Engine, EngineConfig, Identity, InFlightRegistry, ResponseStore};
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Admits every request as an anonymous identity. Stands in for a real
/// authentication chain until one is configured; `StaticTokenAuthenticator`
/// (see `auth.rs`) is the fixture to compose ahead of it in a deployment
/// that needs real credential checks.
struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, _raw_authorization: Option<&str>) -> antwort_gateway::Result<AuthDecision> {
        Ok(AuthDecision::Yes(Identity::new("anonymous")))
    }
}

fn init_logging(settings: &antwort_gateway::config::LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    init_logging(&settings.logging);

    let provider = Arc::new(HttpProvider::new(settings.backend.base_url.clone(), settings.backend.api_key.clone()));
    let store = Arc::new(InMemoryResponseStore::new());
    let in_flight = InFlightRegistry::new();

    let engine = Arc::new(Engine::new(
        provider.clone() as Arc<dyn Provider>,
        Some(store.clone() as Arc<dyn ResponseStore>),
        Vec::new(),
        EngineConfig { default_model: settings.engine.default_model.clone(), max_agentic_turns: settings.engine.max_agentic_turns },
    ));

    let authenticators: Vec<Arc<dyn Authenticator>> = vec![Arc::new(AnonymousAuthenticator)];

    let state = antwort_gateway::http::AppState {
        engine,
        store: Some(store.clone()),
        in_flight,
        authenticators: Arc::new(authenticators),
        default_reject: false,
        max_body_bytes: settings.server.max_body_bytes,
    };

    let router = antwort_gateway::http::build(state);

    let listener = match tokio::net::TcpListener::bind(&settings.server.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {}: {err}", settings.server.bind_addr);
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %settings.server.bind_addr, "antwort-gateway listening");

    let shutdown_timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());

    // Stop accepting new connections on the first signal, then give
    // in-flight requests up to `shutdown_timeout` to finish before the
    // process exits regardless.
    let result = match tokio::time::timeout(shutdown_timeout, serve).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("shutdown timeout elapsed with requests still in flight");
            Ok(())
        }
    };

    provider.close().await;
    store.close().await;

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("server error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
