use anyhow::Context;
use clap::Parser;
use featured_slots::utils::{logger, validation::Validate};
use featured_slots::{run_server, CliConfig, FeaturedService, SqliteListingStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    if config.json_logs() {
        logger::init_json_logger(cli.verbose, config.logging.level.as_deref());
    } else {
        logger::init_server_logger(cli.verbose, config.logging.level.as_deref());
    }

    tracing::info!("Starting featured-slots admin API");
    tracing::debug!("Resolved config: {:?}", config);

    if let Err(e) = config.validate() {
        tracing::error!(
            "Configuration validation failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let addr = config.bind_addr()?;
    let store = SqliteListingStore::open(config.database_path(), config.busy_timeout())
        .with_context(|| format!("opening listing database {}", config.database_path()))?;
    tracing::info!(path = config.database_path(), "Listing store ready");

    let service = Arc::new(FeaturedService::with_retry_policy(
        store,
        config.retry_policy(),
    ));

    run_server(service, addr, shutdown_signal())
        .await
        .context("admin API server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
