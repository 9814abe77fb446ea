use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::employees::EmployeeError;
use crate::workflows::registration::WorkflowError;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    FieldMapping(serde_json::Error),
    Audit(csv::Error),
    Workflow(WorkflowError),
    Employee(EmployeeError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {err}"),
            AppError::Telemetry(err) => write!(f, "telemetry error: {err}"),
            AppError::Io(err) => write!(f, "io error: {err}"),
            AppError::FieldMapping(err) => write!(f, "invalid form field mapping: {err}"),
            AppError::Audit(err) => write!(f, "invalid SVNR export: {err}"),
            AppError::Workflow(err) => write!(f, "registration workflow error: {err}"),
            AppError::Employee(err) => write!(f, "employee record error: {err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::FieldMapping(err) => Some(err),
            AppError::Audit(err) => Some(err),
            AppError::Workflow(err) => Some(err),
            AppError::Employee(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Audit(_) => StatusCode::BAD_REQUEST,
            AppError::Employee(EmployeeError::Svnr(_) | EmployeeError::MissingField(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Employee(EmployeeError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Workflow(WorkflowError::Intake(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Workflow(WorkflowError::AlreadyDecided { .. }) => StatusCode::CONFLICT,
            AppError::Workflow(WorkflowError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Workflow(_)
            | AppError::Employee(EmployeeError::Repository(_))
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::FieldMapping(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::FieldMapping(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Audit(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<EmployeeError> for AppError {
    fn from(value: EmployeeError) -> Self {
        Self::Employee(value)
    }
}
