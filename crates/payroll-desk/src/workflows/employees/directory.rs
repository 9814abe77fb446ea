use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::registration::{AccountId, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Employee as entered or edited by office staff; `svnr` is raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDraft {
    /// Set when editing an existing record.
    #[serde(default)]
    pub id: Option<EmployeeId>,
    pub client_account: AccountId,
    pub first_name: String,
    pub last_name: String,
    pub svnr: String,
}

/// Stored employee. `svnr` is always the normalized ten-digit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub client_account: AccountId,
    pub first_name: String,
    pub last_name: String,
    pub svnr: String,
    pub updated_at: DateTime<Utc>,
}

impl EmployeeRecord {
    /// True when `other` is a different employee carrying the same number.
    pub fn shares_number_with(&self, other: &EmployeeRecord) -> bool {
        self.id != other.id && self.svnr == other.svnr
    }
}

/// Storage for employee records.
///
/// `insert` and `update` own the uniqueness rule: a record whose `svnr` is
/// held by another id is refused with [`DirectoryError::NumberTaken`], checked
/// under the same lock or transaction as the write itself. `update` of an
/// unknown id fails with `RepositoryError::NotFound`.
pub trait EmployeeDirectory: Send + Sync {
    fn insert(&self, record: EmployeeRecord) -> Result<EmployeeRecord, DirectoryError>;
    fn update(&self, record: EmployeeRecord) -> Result<EmployeeRecord, DirectoryError>;
    fn fetch(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("svnr already held by employee {0}")]
    NumberTaken(EmployeeId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
