use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Administrator (or system actor) taking a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Reference to an account owned by the external account store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference back to the form submission a registration came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

/// Postal address; every part is optional on intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.postcode.is_none()
            && self.city.is_none()
            && self.country.is_none()
    }
}

/// Normalized registrant details captured from the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrantData {
    pub company_name: String,
    pub company_email: String,
    #[serde(default)]
    pub contact_first_name: Option<String>,
    #[serde(default)]
    pub contact_last_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub company_phone: Option<String>,
    #[serde(default)]
    pub uid_number: Option<String>,
    #[serde(default)]
    pub address: Address,
}

impl RegistrantData {
    /// Contact person's name, falling back to the company name.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [&self.contact_first_name, &self.contact_last_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        if parts.is_empty() {
            self.company_name.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Address that should receive decision notices.
    pub fn notification_recipient(&self) -> &str {
        &self.company_email
    }
}

/// Lifecycle of a registration. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, RegistrationStatus::Pending)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An administrator's verdict, applied to a record in one conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub actor: ActorId,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn approve(actor: ActorId, decided_at: DateTime<Utc>) -> Self {
        Self {
            verdict: Verdict::Approve,
            actor,
            decided_at,
        }
    }

    pub fn reject(actor: ActorId, reason: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self {
            verdict: Verdict::Reject {
                reason: reason.into(),
            },
            actor,
            decided_at,
        }
    }

    pub fn target_status(&self) -> RegistrationStatus {
        match self.verdict {
            Verdict::Approve => RegistrationStatus::Approved,
            Verdict::Reject { .. } => RegistrationStatus::Rejected,
        }
    }
}

/// Raised when a decision hits a record that has already left `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("registration already {}", .current.label())]
pub struct TransitionConflict {
    pub current: RegistrationStatus,
}

/// A prospective client awaiting (or past) an administrator's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub id: RegistrationId,
    pub registrant: RegistrantData,
    pub status: RegistrationStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<ActorId>,
    pub rejection_reason: Option<String>,
    pub source_submission_id: Option<SubmissionId>,
    /// Account already registered under the company e-mail when the form arrived.
    pub existing_account: Option<AccountId>,
    /// Account provisioned or reused on approval.
    pub account_id: Option<AccountId>,
}

impl PendingRegistration {
    pub fn new(
        id: RegistrationId,
        registrant: RegistrantData,
        submitted_at: DateTime<Utc>,
        source_submission_id: Option<SubmissionId>,
    ) -> Self {
        Self {
            id,
            registrant,
            status: RegistrationStatus::Pending,
            submitted_at,
            decided_at: None,
            decided_by: None,
            rejection_reason: None,
            source_submission_id,
            existing_account: None,
            account_id: None,
        }
    }

    /// Apply a decision in place. Stores call this while holding whatever lock
    /// or transaction makes check-and-set a single step.
    pub fn apply(&mut self, decision: &Decision) -> Result<(), TransitionConflict> {
        if self.status.is_terminal() {
            return Err(TransitionConflict {
                current: self.status,
            });
        }

        self.status = decision.target_status();
        self.decided_at = Some(decision.decided_at);
        self.decided_by = Some(decision.actor.clone());
        if let Verdict::Reject { reason } = &decision.verdict {
            self.rejection_reason = Some(reason.clone());
        }
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == RegistrationStatus::Pending
    }

    pub fn awaiting_provisioning(&self) -> bool {
        self.status == RegistrationStatus::Approved && self.account_id.is_none()
    }

    pub fn view(&self) -> RegistrationView {
        RegistrationView {
            registration_id: self.id.clone(),
            status: self.status.label(),
            company_name: self.registrant.company_name.clone(),
            company_email: self.registrant.company_email.clone(),
            submitted_at: self.submitted_at,
            decided_at: self.decided_at,
            decided_by: self.decided_by.clone(),
            rejection_reason: self.rejection_reason.clone(),
            account_id: self.account_id.clone(),
            existing_account: self.existing_account.is_some(),
        }
    }
}

/// Representation of a registration exposed to administrators.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationView {
    pub registration_id: RegistrationId,
    pub status: &'static str,
    pub company_name: String,
    pub company_email: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    pub existing_account: bool,
}
