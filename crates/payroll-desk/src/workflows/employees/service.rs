use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::directory::{
    DirectoryError, EmployeeDirectory, EmployeeDraft, EmployeeId, EmployeeRecord,
};
use crate::svnr::{self, SvnrError};
use crate::workflows::registration::intake::normalize_value;
use crate::workflows::registration::RepositoryError;

static EMPLOYEE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_employee_id() -> EmployeeId {
    let id = EMPLOYEE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EmployeeId(format!("emp-{id:06}"))
}

/// Validates employee edits before they reach the directory.
pub struct EmployeeRegistry<D> {
    directory: Arc<D>,
}

impl<D> EmployeeRegistry<D>
where
    D: EmployeeDirectory + 'static,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// Create or update an employee. The SVNR must pass the checksum and may
    /// not belong to any other stored employee.
    pub fn save(&self, draft: EmployeeDraft) -> Result<EmployeeRecord, EmployeeError> {
        let first_name =
            normalize_value(&draft.first_name).ok_or(EmployeeError::MissingField("first_name"))?;
        let last_name =
            normalize_value(&draft.last_name).ok_or(EmployeeError::MissingField("last_name"))?;

        let normalized = svnr::validate(&draft.svnr).into_result()?;
        let editing = draft.id.clone();

        let record = EmployeeRecord {
            id: draft.id.unwrap_or_else(next_employee_id),
            client_account: draft.client_account,
            first_name,
            last_name,
            svnr: normalized,
            updated_at: Utc::now(),
        };

        let written = match &editing {
            Some(_) => self.directory.update(record),
            None => self.directory.insert(record),
        };
        let stored = written.map_err(|err| match (err, editing) {
            (DirectoryError::NumberTaken(holder), _) => {
                EmployeeError::Svnr(SvnrError::DuplicateNumber { holder: holder.0 })
            }
            (DirectoryError::Repository(RepositoryError::NotFound), Some(id)) => {
                EmployeeError::NotFound(id)
            }
            (DirectoryError::Repository(other), _) => EmployeeError::Repository(other),
        })?;

        info!(employee_id = %stored.id, client = %stored.client_account, "employee saved");
        Ok(stored)
    }

    pub fn get(&self, id: &EmployeeId) -> Result<EmployeeRecord, EmployeeError> {
        self.directory
            .fetch(id)?
            .ok_or_else(|| EmployeeError::NotFound(id.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmployeeError {
    #[error("employee {0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Svnr(#[from] SvnrError),
    #[error("employee {0} not found")]
    NotFound(EmployeeId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
