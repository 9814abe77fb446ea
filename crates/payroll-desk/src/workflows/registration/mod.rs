//! Client registration intake and the approve/reject decision workflow.
//!
//! Registrations arrive from the public form as `pending` records. An
//! administrator approves or rejects each exactly once; the status change is
//! a conditional write in the record store, and account provisioning plus
//! notifications run only after it has been committed.

pub mod domain;
pub mod intake;
pub mod provisioning;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AccountId, ActorId, Address, Decision, PendingRegistration, RegistrantData, RegistrationId,
    RegistrationStatus, RegistrationView, SubmissionId, TransitionConflict, Verdict,
};
pub use intake::{FieldMapping, FormSubmission, IntakeError, RegistrantField};
pub use provisioning::{
    AccessLink, AccountProfile, AccountRole, AccountStore, AccountStoreError, ClientAccount,
    GeneratedCredential, ProvisionedAccount, Provisioner,
};
pub use repository::{
    Notification, NotificationError, NotificationSender, NotificationTemplate,
    RegistrationRepository, RepositoryError, WorkflowWarning,
};
pub use router::registration_router;
pub use service::{ApprovalResult, RegistrationWorkflow, RejectionResult, WorkflowError};
