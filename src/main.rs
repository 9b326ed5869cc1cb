use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use opd_core::{ChangeSubscription, CoreConfig, Services};

/// Logs every change the services publish until the bus closes.
async fn log_changes(mut changes: ChangeSubscription) {
    while let Some(event) = changes.recv().await {
        tracing::info!(kind = ?event.kind, id = ?event.id, action = %event.action, "record changed");
    }
}

/// Main entry point for the OPD application
///
/// Opens the database, starts the REST server and a change-log task on the services' bus.
///
/// # Environment Variables
/// - `OPD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `OPD_DATABASE_PATH`: SQLite database file (default: "opd_data/opd.sqlite3")
/// - `OPD_PRESCRIPTION_CAP`: proformas fanned out per patient view (default: 10, `none` disables)
///
/// # Returns
/// * `Ok(())` - If the server runs and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, database or server startup fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opd_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("opd_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("OPD_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    let cfg = CoreConfig::from_env_values(
        std::env::var("OPD_DATABASE_PATH").ok(),
        std::env::var("OPD_PRESCRIPTION_CAP").ok(),
    )?;
    let services = Services::open(&cfg)?;

    tracing::info!("++ Starting OPD REST on {}", rest_addr);
    tracing::info!("++ Database at {}", cfg.database_path().display());

    let change_log = tokio::spawn(log_changes(services.bus().subscribe()));

    let app = router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app).await?;

    change_log.abort();
    Ok(())
}
