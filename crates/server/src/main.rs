//! Banking assistant server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use bankbot_agent::ChatOrchestrator;
use bankbot_config::{constants, load_settings, DomainCatalog, Settings};
use bankbot_llm::{LlmGateway, OpenAIBackend, OpenAIConfig};
use bankbot_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var(constants::ENV_SELECTOR).ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    tracing::info!("Starting banking assistant v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        crm_mode = ?config.crm.mode,
        "Configuration loaded"
    );

    let catalog = match DomainCatalog::load_or_default(config.catalog_path.as_deref()) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load domain catalog");
            std::process::exit(1);
        }
    };
    tracing::info!(
        bank = %catalog.bank.bank_name,
        products = catalog.products.len(),
        branches = catalog.branches.locations.len(),
        "Loaded domain catalog"
    );

    let crm = match bankbot_crm::init(&config.crm) {
        Ok(crm) => crm,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize CRM client");
            std::process::exit(1);
        }
    };

    let backend = OpenAIBackend::new(OpenAIConfig::from_settings(&config.llm))?;
    let llm = Arc::new(LlmGateway::new(Arc::new(backend), catalog.clone()));
    tracing::info!(model = %llm.model_name(), "Language model configured");

    let orchestrator = Arc::new(ChatOrchestrator::new(
        llm,
        crm,
        catalog,
        config.tenant(),
    ));

    let metrics_handle = if config.observability.metrics_enabled {
        match init_metrics() {
            Ok(handle) => {
                tracing::info!("Initialized Prometheus metrics at /metrics");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let slowest_turn = 3 * config.llm.timeout_seconds + 2 * config.crm.timeout_seconds;
    if config.server.timeout_seconds < slowest_turn {
        tracing::warn!(
            request_timeout = config.server.timeout_seconds,
            slowest_turn,
            "Request timeout is shorter than a chat turn can take"
        );
    }

    let state = AppState::new(config.clone(), orchestrator, metrics_handle)?;
    let cleanup = state.sessions.start_cleanup_task();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Console tracing, JSON when `observability.log_json` is set
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("bankbot={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
