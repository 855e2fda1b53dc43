use crate::cli::ServeArgs;
use crate::infra::{mock_collaborators, AppState};
use crate::routes::with_financing_routes;
use agricred::config::AppConfig;
use agricred::error::AppError;
use agricred::telemetry;
use agricred::workflows::financing::DraftRegistry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let collaborators = mock_collaborators(Duration::from_millis(args.mock_latency_ms));
    let registry = Arc::new(DraftRegistry::new(
        collaborators,
        config.financing.session_settings(),
    ));

    let app = with_financing_routes(registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        timeout_secs = config.financing.collaborator_timeout.as_secs(),
        "agricred financing service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
