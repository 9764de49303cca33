use api_shared::HealthService;
use prm_core::{AppServices, ConfigValues, CoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the PRM application
///
/// Resolves configuration once, builds the store and auth backends, and serves the REST API
/// (with Swagger UI at `/swagger-ui`) until Ctrl-C.
///
/// # Environment Variables
/// - `PRM_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PRM_STORE`: `memory`, `file` or `firestore` (default: "file")
/// - `PATIENT_DATA_DIR`: Directory for the file store and local accounts (default: "patient_data")
/// - `PRM_AUTH`: `local` or `firebase` (default: "local")
/// - `FIREBASE_PROJECT_ID`, `FIREBASE_API_KEY`: hosted backends
/// - `PRM_SESSION_TTL_SECS`, `PRM_PAGE_SIZE`: session lifetime and default page size
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prm_run=info".parse()?)
                .add_directive("prm_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("PRM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = CoreConfig::from_values(ConfigValues::from_env())?;
    if let Some(dir) = config.patient_data_dir() {
        tracing::info!("patient data directory: {}", dir.display());
    }
    let services = AppServices::build(config)?;
    tracing::info!("{}", HealthService::check_health().message);

    api_rest::run(&rest_addr, services).await
}
