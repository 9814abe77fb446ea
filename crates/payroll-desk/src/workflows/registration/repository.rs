use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    AccountId, Decision, PendingRegistration, RegistrationId, RegistrationStatus,
};

/// Storage abstraction so the workflow can be exercised in isolation.
///
/// `decide` is the only way a status changes and must be a single conditional
/// write: it succeeds only while the stored status is still `pending`.
/// Implementations holding records in memory can lean on
/// [`PendingRegistration::apply`] under their lock.
pub trait RegistrationRepository: Send + Sync {
    fn insert(&self, record: PendingRegistration)
        -> Result<PendingRegistration, RepositoryError>;
    fn fetch(&self, id: &RegistrationId) -> Result<Option<PendingRegistration>, RepositoryError>;
    fn decide(
        &self,
        id: &RegistrationId,
        decision: &Decision,
    ) -> Result<PendingRegistration, RepositoryError>;
    fn link_account(
        &self,
        id: &RegistrationId,
        account: &AccountId,
    ) -> Result<PendingRegistration, RepositoryError>;
    /// Records oldest first, optionally restricted to one status.
    fn list(
        &self,
        status: Option<RegistrationStatus>,
        limit: usize,
    ) -> Result<Vec<PendingRegistration>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("registration already {}", .current.label())]
    StatusConflict { current: RegistrationStatus },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (mail transport, ticketing, ...).
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    /// Office inbox: a new registration is waiting for review.
    RegistrationReceived,
    /// Registrant: approved, a fresh account and credential were created.
    ApprovedNewAccount,
    /// Registrant: approved, the existing login keeps working.
    ApprovedExistingAccount,
    RegistrationRejected,
}

impl NotificationTemplate {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationTemplate::RegistrationReceived => "registration_received",
            NotificationTemplate::ApprovedNewAccount => "approved_new_account",
            NotificationTemplate::ApprovedExistingAccount => "approved_existing_account",
            NotificationTemplate::RegistrationRejected => "registration_rejected",
        }
    }
}

/// Notification payload so senders and tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub template: NotificationTemplate,
    pub registration_id: RegistrationId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient rejected: {0}")]
    Recipient(String),
}

/// Non-fatal condition raised after a decision was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowWarning {
    NotificationDeliveryFailed {
        recipient: String,
        template: NotificationTemplate,
        reason: String,
    },
    AccessLinkUnavailable {
        reason: String,
    },
}
