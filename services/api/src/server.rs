use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;
use visa_tracker::config::AppConfig;
use visa_tracker::error::AppError;
use visa_tracker::telemetry;
use visa_tracker::workflows::visa::{
    NotificationDispatcher, StatusValue, TrackingId, VisaStatusService,
};

use crate::cli::ServeArgs;
use crate::infra::{
    sample_document, AppState, InMemoryApplicationStore, LoggingMailTransport, SAMPLE_TRACKING_ID,
};
use crate::routes::with_application_routes;

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

    let store = Arc::new(InMemoryApplicationStore::default());
    if args.seed_sample {
        let id = TrackingId::from(SAMPLE_TRACKING_ID);
        store.seed(
            id.clone(),
            sample_document(&id, &[StatusValue::Paid, StatusValue::Paid, StatusValue::Paid]),
        );
        info!(tracking_id = %id, "sample application seeded");
    }

    let service = Arc::new(VisaStatusService::new(store));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(LoggingMailTransport::default()),
        config.notification.clone(),
    ));

    let app = with_application_routes(service, dispatcher)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "visa tracker ready");

    axum::serve(listener, app).await?;
    Ok(())
}
