//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server (with
//! OpenAPI/Swagger UI). The workspace's main `opd-run` binary also logs every change published
//! by the services.

use api_rest::{router, AppState};
use opd_core::{CoreConfig, Services};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the OPD REST API server
///
/// # Environment Variables
/// - `OPD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `OPD_DATABASE_PATH`: SQLite database file (default: "opd_data/opd.sqlite3")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the database cannot be opened or migrated,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("opd_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("OPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = CoreConfig::from_env_values(
        std::env::var("OPD_DATABASE_PATH").ok(),
        std::env::var("OPD_PRESCRIPTION_CAP").ok(),
    )?;
    let services = Services::open(&cfg)?;

    tracing::info!(
        "-- Starting OPD REST API on {} (database {})",
        addr,
        cfg.database_path().display()
    );

    let app = router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
