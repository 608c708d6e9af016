//! NotiPrefs server
//!
//! Notification preference backend: organization/group/topic management,
//! per-user preferences and the notification decision endpoint.
//!
//! # Graceful Shutdown
//!
//! The server handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Database connections are closed cleanly

use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use notiprefs::api::{self, AppState};
use notiprefs::database::{self, Database};
use notiprefs::{Config, PgStore, Repository, Result};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("NotiPrefs engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded and validated");

    let db = Database::new(&config.database).await?;
    info!("Database connection pool established");

    database::run_migrations(db.pool()).await?;

    let repo: Arc<dyn Repository> = Arc::new(PgStore::new(db.pool().clone()));
    let state = Arc::new(AppState::new(repo, config.channels.clone()));

    info!(
        "API: http://{}:{} (health: /health)",
        config.api.host, config.api.port
    );
    api::start_server(state, &config.api, shutdown_signal()).await?;

    db.close().await;
    info!("NotiPrefs engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
///
/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("notiprefs=debug,notiprefs_engine=debug,tower_http=debug,sqlx=warn,info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let fmt_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(std::env::var("NO_COLOR").is_err())
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
