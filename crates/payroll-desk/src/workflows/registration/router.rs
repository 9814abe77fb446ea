use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ActorId, RegistrationId, RegistrationStatus, RegistrationView};
use super::intake::FormSubmission;
use super::provisioning::AccountStore;
use super::repository::{NotificationSender, RegistrationRepository, RepositoryError};
use super::service::{RegistrationWorkflow, WorkflowError};

const DEFAULT_LIST_LIMIT: usize = 50;

type SharedWorkflow<R, S, N> = Arc<RegistrationWorkflow<R, S, N>>;

/// Router builder exposing HTTP endpoints for intake and administrator decisions.
pub fn registration_router<R, S, N>(workflow: SharedWorkflow<R, S, N>) -> Router
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route(
            "/api/v1/registrations",
            post(submit_handler::<R, S, N>).get(list_handler::<R, S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id",
            get(status_handler::<R, S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/approve",
            post(approve_handler::<R, S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/reject",
            post(reject_handler::<R, S, N>),
        )
        .route(
            "/api/v1/registrations/:registration_id/provision",
            post(provision_handler::<R, S, N>),
        )
        .with_state(workflow)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApproveRequest {
    actor_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectRequest {
    actor_id: String,
    #[serde(default)]
    reason: String,
}

pub(crate) async fn submit_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    axum::Json(submission): axum::Json<FormSubmission>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    match workflow.submit_form(submission) {
        Ok(record) => (StatusCode::ACCEPTED, axum::Json(record.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match RegistrationStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                let payload = json!({ "error": format!("unknown status '{raw}'") });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        },
    };

    match workflow.list(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT)) {
        Ok(records) => {
            let views: Vec<RegistrationView> = records.iter().map(|record| record.view()).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    Path(registration_id): Path<String>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    match workflow.get(&RegistrationId(registration_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    Path(registration_id): Path<String>,
    axum::Json(request): axum::Json<ApproveRequest>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.approve(&id, ActorId(request.actor_id)) {
        Ok(result) => {
            let payload = json!({
                "registration": result.registration.view(),
                "account_id": result.account.id,
                "account_created": result.account_created,
                "access_link_expires_at": result.access_link.as_ref().map(|link| link.expires_at),
                "warnings": result.warnings,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    Path(registration_id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    let id = RegistrationId(registration_id);
    match workflow.reject(&id, ActorId(request.actor_id), request.reason) {
        Ok(result) => {
            let payload = json!({
                "registration": result.registration.view(),
                "warnings": result.warnings,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn provision_handler<R, S, N>(
    State(workflow): State<SharedWorkflow<R, S, N>>,
    Path(registration_id): Path<String>,
) -> Response
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    match workflow.complete_provisioning(&RegistrationId(registration_id)) {
        Ok(result) => {
            let payload = json!({
                "registration": result.registration.view(),
                "account_id": result.account.id,
                "account_created": result.account_created,
                "warnings": result.warnings,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::Intake(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::NotFound(_) | WorkflowError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::AlreadyDecided { .. }
        | WorkflowError::NotApproved { .. }
        | WorkflowError::AlreadyProvisioned(_)
        | WorkflowError::Repository(RepositoryError::Conflict)
        | WorkflowError::Repository(RepositoryError::StatusConflict { .. }) => StatusCode::CONFLICT,
        WorkflowError::Provisioning { .. } => StatusCode::BAD_GATEWAY,
        WorkflowError::Repository(RepositoryError::Unavailable(_))
        | WorkflowError::Accounts(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({ "error": error.to_string() });
    if let WorkflowError::AlreadyDecided { current, .. } = &error {
        payload["status"] = json!(current.label());
    }
    (status, axum::Json(payload)).into_response()
}
