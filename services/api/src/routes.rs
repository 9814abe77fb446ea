use crate::infra::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use payroll_desk::error::AppError;
use payroll_desk::svnr::{self, ValidationResult};
use payroll_desk::workflows::employees::{
    EmployeeDirectory, EmployeeDraft, EmployeeId, EmployeeRecord, EmployeeRegistry,
};
use payroll_desk::workflows::registration::{
    registration_router, AccountStore, NotificationSender, RegistrationRepository,
    RegistrationWorkflow,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct SvnrValidateRequest {
    pub(crate) svnr: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SvnrValidateResponse {
    #[serde(flatten)]
    pub(crate) result: ValidationResult,
    pub(crate) display: String,
}

pub(crate) fn with_service_routes<R, S, N, D>(
    workflow: Arc<RegistrationWorkflow<R, S, N>>,
    employees: Arc<EmployeeRegistry<D>>,
) -> Router
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
    D: EmployeeDirectory + 'static,
{
    registration_router(workflow)
        .merge(employee_routes(employees))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/svnr/validate", post(svnr_validate_endpoint))
}

fn employee_routes<D>(employees: Arc<EmployeeRegistry<D>>) -> Router
where
    D: EmployeeDirectory + 'static,
{
    Router::new()
        .route("/api/v1/employees", post(save_employee_endpoint::<D>))
        .route("/api/v1/employees/:employee_id", get(employee_endpoint::<D>))
        .with_state(employees)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Validation never fails at the HTTP level; an invalid number is a normal
/// `200` answer carrying the reason.
pub(crate) async fn svnr_validate_endpoint(
    Json(payload): Json<SvnrValidateRequest>,
) -> Json<SvnrValidateResponse> {
    let result = svnr::validate(&payload.svnr);
    let display = svnr::format_display(&result.normalized);
    Json(SvnrValidateResponse { result, display })
}

pub(crate) async fn save_employee_endpoint<D>(
    State(employees): State<Arc<EmployeeRegistry<D>>>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<Json<EmployeeRecord>, AppError>
where
    D: EmployeeDirectory + 'static,
{
    Ok(Json(employees.save(draft)?))
}

pub(crate) async fn employee_endpoint<D>(
    State(employees): State<Arc<EmployeeRegistry<D>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<EmployeeRecord>, AppError>
where
    D: EmployeeDirectory + 'static,
{
    Ok(Json(employees.get(&EmployeeId(employee_id))?))
}
