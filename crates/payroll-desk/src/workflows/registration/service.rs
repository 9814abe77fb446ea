use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ActorId, Decision, PendingRegistration, RegistrantData, RegistrationId, RegistrationStatus,
    SubmissionId,
};
use super::intake::{self, FieldMapping, FormSubmission, IntakeError};
use super::provisioning::{
    AccessLink, AccountStore, AccountStoreError, ClientAccount, ProvisionedAccount, Provisioner,
};
use super::repository::{
    Notification, NotificationSender, NotificationTemplate, RegistrationRepository,
    RepositoryError, WorkflowWarning,
};
use crate::config::WorkflowConfig;

/// Approve/reject state machine over pending client registrations.
pub struct RegistrationWorkflow<R, S, N> {
    repository: Arc<R>,
    accounts: Arc<S>,
    notifications: Arc<N>,
    provisioner: Provisioner,
    mapping: FieldMapping,
    office_email: Option<String>,
}

static REGISTRATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_registration_id() -> RegistrationId {
    let id = REGISTRATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RegistrationId(format!("reg-{id:06}"))
}

/// Outcome of a successful approval.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub registration: PendingRegistration,
    pub account: ClientAccount,
    /// `false` when an existing client login was reused.
    pub account_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_link: Option<AccessLink>,
    pub warnings: Vec<WorkflowWarning>,
}

/// Outcome of a successful rejection.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionResult {
    pub registration: PendingRegistration,
    pub warnings: Vec<WorkflowWarning>,
}

impl<R, S, N> RegistrationWorkflow<R, S, N>
where
    R: RegistrationRepository + 'static,
    S: AccountStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        repository: Arc<R>,
        accounts: Arc<S>,
        notifications: Arc<N>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            repository,
            accounts,
            notifications,
            provisioner: Provisioner::from_config(config),
            mapping: FieldMapping::standard(),
            office_email: config.office_email.clone(),
        }
    }

    pub fn with_field_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Accept a registration. Every call stores a new record, even for
    /// repeated data.
    pub fn submit(
        &self,
        registrant: RegistrantData,
    ) -> Result<PendingRegistration, WorkflowError> {
        self.store_submission(registrant, None)
    }

    /// Map a raw form submission through the configured field table, then submit.
    pub fn submit_form(
        &self,
        submission: FormSubmission,
    ) -> Result<PendingRegistration, WorkflowError> {
        let registrant = self.mapping.registrant_from(&submission);
        self.store_submission(registrant, submission.submission_id)
    }

    fn store_submission(
        &self,
        registrant: RegistrantData,
        source: Option<SubmissionId>,
    ) -> Result<PendingRegistration, WorkflowError> {
        let registrant = intake::sanitize(registrant)?;
        let existing = self.accounts.find_by_email(&registrant.company_email)?;

        let mut record =
            PendingRegistration::new(next_registration_id(), registrant, Utc::now(), source);
        record.existing_account = existing.map(|account| account.id);

        let stored = self.repository.insert(record)?;
        info!(
            registration_id = %stored.id,
            existing_account = stored.existing_account.is_some(),
            "client registration submitted"
        );

        if let Some(office) = &self.office_email {
            let mut details = BTreeMap::new();
            details.insert(
                "company_name".to_string(),
                stored.registrant.company_name.clone(),
            );
            details.insert(
                "company_email".to_string(),
                stored.registrant.company_email.clone(),
            );
            // Office notice failures stay in the log; the submitter's result
            // carries no warnings.
            let mut warnings = Vec::new();
            self.notify(
                Notification {
                    recipient: office.clone(),
                    template: NotificationTemplate::RegistrationReceived,
                    registration_id: stored.id.clone(),
                    details,
                },
                &mut warnings,
            );
        }

        Ok(stored)
    }

    /// Approve a pending registration and link it to a client account.
    ///
    /// The status flip is committed first; account provisioning and the
    /// welcome notice follow and never undo it.
    pub fn approve(
        &self,
        id: &RegistrationId,
        actor: ActorId,
    ) -> Result<ApprovalResult, WorkflowError> {
        let decided_at = Utc::now();
        let registration = self.decide(id, &Decision::approve(actor, decided_at))?;
        info!(
            registration_id = %registration.id,
            decided_by = ?registration.decided_by,
            "client registration approved"
        );
        self.provision_and_notify(registration, decided_at)
    }

    /// Reject a pending registration. The reason is always recorded, even when empty.
    pub fn reject(
        &self,
        id: &RegistrationId,
        actor: ActorId,
        reason: impl Into<String>,
    ) -> Result<RejectionResult, WorkflowError> {
        let reason = reason.into();
        let registration = self.decide(id, &Decision::reject(actor, reason.clone(), Utc::now()))?;
        info!(
            registration_id = %registration.id,
            decided_by = ?registration.decided_by,
            "client registration rejected"
        );

        let mut details = BTreeMap::new();
        details.insert(
            "company_name".to_string(),
            registration.registrant.company_name.clone(),
        );
        details.insert("reason".to_string(), reason);

        let mut warnings = Vec::new();
        self.notify(
            Notification {
                recipient: registration.registrant.notification_recipient().to_string(),
                template: NotificationTemplate::RegistrationRejected,
                registration_id: registration.id.clone(),
                details,
            },
            &mut warnings,
        );

        Ok(RejectionResult {
            registration,
            warnings,
        })
    }

    /// Re-run provisioning for an approved registration whose account step
    /// failed after the decision was committed.
    pub fn complete_provisioning(
        &self,
        id: &RegistrationId,
    ) -> Result<ApprovalResult, WorkflowError> {
        let registration = self.get(id)?;
        if registration.status != RegistrationStatus::Approved {
            return Err(WorkflowError::NotApproved {
                id: id.clone(),
                current: registration.status,
            });
        }
        if registration.account_id.is_some() {
            return Err(WorkflowError::AlreadyProvisioned(id.clone()));
        }
        self.provision_and_notify(registration, Utc::now())
    }

    pub fn get(&self, id: &RegistrationId) -> Result<PendingRegistration, WorkflowError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    pub fn list(
        &self,
        status: Option<RegistrationStatus>,
        limit: usize,
    ) -> Result<Vec<PendingRegistration>, WorkflowError> {
        Ok(self.repository.list(status, limit)?)
    }

    fn decide(
        &self,
        id: &RegistrationId,
        decision: &Decision,
    ) -> Result<PendingRegistration, WorkflowError> {
        match self.repository.decide(id, decision) {
            Ok(registration) => Ok(registration),
            Err(RepositoryError::StatusConflict { current }) => {
                Err(WorkflowError::AlreadyDecided {
                    id: id.clone(),
                    current,
                })
            }
            Err(RepositoryError::NotFound) => Err(WorkflowError::NotFound(id.clone())),
            Err(other) => Err(other.into()),
        }
    }

    fn provision_and_notify(
        &self,
        registration: PendingRegistration,
        now: DateTime<Utc>,
    ) -> Result<ApprovalResult, WorkflowError> {
        let provisioned = self
            .provisioner
            .provision(self.accounts.as_ref(), &registration)
            .map_err(|source| {
                warn!(
                    registration_id = %registration.id,
                    error = %source,
                    "account provisioning failed after approval"
                );
                WorkflowError::Provisioning {
                    id: registration.id.clone(),
                    source,
                }
            })?;

        let registration = self
            .repository
            .link_account(&registration.id, &provisioned.account.id)?;

        let mut warnings = Vec::new();
        let access_link = match self.provisioner.issue_access_link(
            self.accounts.as_ref(),
            &provisioned.account.id,
            now,
        ) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(
                    registration_id = %registration.id,
                    error = %err,
                    "access link could not be stored"
                );
                warnings.push(WorkflowWarning::AccessLinkUnavailable {
                    reason: err.to_string(),
                });
                None
            }
        };

        self.notify(
            welcome_notice(&registration, &provisioned, access_link.as_ref()),
            &mut warnings,
        );

        Ok(ApprovalResult {
            account_created: !provisioned.reused(),
            account: provisioned.account,
            registration,
            access_link,
            warnings,
        })
    }

    fn notify(&self, notification: Notification, warnings: &mut Vec<WorkflowWarning>) {
        let recipient = notification.recipient.clone();
        let template = notification.template;
        let registration_id = notification.registration_id.clone();

        if let Err(err) = self.notifications.send(notification) {
            warn!(
                %registration_id,
                %recipient,
                template = template.label(),
                error = %err,
                "notification delivery failed"
            );
            warnings.push(WorkflowWarning::NotificationDeliveryFailed {
                recipient,
                template,
                reason: err.to_string(),
            });
        }
    }
}

fn welcome_notice(
    registration: &PendingRegistration,
    provisioned: &ProvisionedAccount,
    access_link: Option<&AccessLink>,
) -> Notification {
    let mut details = BTreeMap::new();
    details.insert(
        "company_name".to_string(),
        registration.registrant.company_name.clone(),
    );
    details.insert("login".to_string(), provisioned.account.login.clone());

    let template = match &provisioned.credential {
        Some(credential) => {
            details.insert("password".to_string(), credential.expose().to_string());
            NotificationTemplate::ApprovedNewAccount
        }
        None => {
            details.insert(
                "credentials".to_string(),
                "your existing password remains valid".to_string(),
            );
            NotificationTemplate::ApprovedExistingAccount
        }
    };

    if let Some(link) = access_link {
        details.insert("access_link".to_string(), link.url.clone());
        details.insert("access_link_expires_at".to_string(), link.expires_at.to_rfc3339());
    }

    Notification {
        recipient: registration.registrant.notification_recipient().to_string(),
        template,
        registration_id: registration.id.clone(),
        details,
    }
}

/// Error raised by the registration workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("registration {id} was already {}", .current.label())]
    AlreadyDecided {
        id: RegistrationId,
        current: RegistrationStatus,
    },
    #[error("registration {0} not found")]
    NotFound(RegistrationId),
    #[error("registration {id} is {}, not approved", .current.label())]
    NotApproved {
        id: RegistrationId,
        current: RegistrationStatus,
    },
    #[error("registration {0} already has a linked account")]
    AlreadyProvisioned(RegistrationId),
    #[error("account provisioning failed for approved registration {id}")]
    Provisioning {
        id: RegistrationId,
        #[source]
        source: AccountStoreError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Accounts(#[from] AccountStoreError),
}
