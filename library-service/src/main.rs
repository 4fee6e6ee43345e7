use library_service::{config::LibraryConfig, Application};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = LibraryConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    library_service::services::metrics::init_metrics();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = config.environment.as_str(),
    );

    async move {
        tracing::info!("Starting library service");

        let application = Application::build(config).await?;
        application.run_until_stopped().await?;

        tracing::info!("Service shutdown complete");
        Ok::<(), AppError>(())
    }
    .instrument(service_span)
    .await
}
