//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging with OpenAPI/Swagger UI. The workspace's main `prm-run`
//! binary runs the same server with the same configuration.

use prm_core::{AppServices, ConfigValues, CoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the PRM REST API server
///
/// # Environment Variables
/// - `PRM_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `PRM_STORE`, `PATIENT_DATA_DIR`, `PRM_AUTH`, `FIREBASE_PROJECT_ID`, `FIREBASE_API_KEY`,
///   `PRM_SESSION_TTL_SECS`, `PRM_PAGE_SIZE`: see [`prm_core::config`]
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the backends cannot be opened, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("prm_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PRM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let config = CoreConfig::from_values(ConfigValues::from_env())?;
    let services = AppServices::build(config)?;

    api_rest::run(&addr, services).await
}
