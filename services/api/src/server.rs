use crate::cli::ServeArgs;
use crate::infra::{
    load_field_mapping, AppState, InMemoryAccountStore, InMemoryEmployeeDirectory,
    InMemoryRegistrationRepository, LoggingNotificationSender,
};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use payroll_desk::config::AppConfig;
use payroll_desk::error::AppError;
use payroll_desk::telemetry;
use payroll_desk::workflows::employees::EmployeeRegistry;
use payroll_desk::workflows::registration::RegistrationWorkflow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let mapping = load_field_mapping(&config.workflow)?;
    let workflow = Arc::new(
        RegistrationWorkflow::new(
            Arc::new(InMemoryRegistrationRepository::default()),
            Arc::new(InMemoryAccountStore::default()),
            Arc::new(LoggingNotificationSender),
            &config.workflow,
        )
        .with_field_mapping(mapping),
    );
    let employees = Arc::new(EmployeeRegistry::new(Arc::new(
        InMemoryEmployeeDirectory::default(),
    )));

    let app = with_service_routes(workflow, employees)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        office_notices = config.workflow.office_email.is_some(),
        "payroll desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
