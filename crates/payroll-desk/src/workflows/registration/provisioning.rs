use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::domain::{AccountId, Address, PendingRegistration};
use crate::config::WorkflowConfig;

/// Client account store consumed by the approval step.
///
/// Logins are unique: `create` must fail with [`AccountStoreError::LoginTaken`]
/// when the login exists, checked atomically with the insert. Overlapping
/// provisioning runs for one registration rely on this to end with a single
/// account.
pub trait AccountStore: Send + Sync {
    fn find_by_email(&self, email: &str) -> Result<Option<ClientAccount>, AccountStoreError>;
    fn find_by_login(&self, login: &str) -> Result<Option<ClientAccount>, AccountStoreError>;
    fn create(
        &self,
        profile: &AccountProfile,
        credential: &GeneratedCredential,
    ) -> Result<ClientAccount, AccountStoreError>;
    fn update_profile(&self, id: &AccountId, profile: &AccountProfile)
        -> Result<(), AccountStoreError>;
    /// Persist a single-use login link; redemption is the store's concern.
    fn store_access_link(&self, id: &AccountId, link: &AccessLink)
        -> Result<(), AccountStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AccountStoreError {
    #[error("login '{0}' is already taken")]
    LoginTaken(String),
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

/// Capability set of an account in the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Client,
    Subscriber,
    Editor,
    Administrator,
}

impl AccountRole {
    /// Accounts that must never be repurposed as client logins.
    pub const fn is_privileged(self) -> bool {
        matches!(self, AccountRole::Editor | AccountRole::Administrator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAccount {
    pub id: AccountId,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub role: AccountRole,
}

/// Profile fields written to the account store on approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: String,
    pub phone: Option<String>,
    pub uid_number: Option<String>,
    pub address: Address,
    pub role: AccountRole,
}

/// Freshly generated password. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedCredential(String);

impl GeneratedCredential {
    pub fn generate(length: usize) -> Self {
        Self(random_token(length))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GeneratedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GeneratedCredential(<redacted>)")
    }
}

/// Time-boxed, single-use login link offered next to (or instead of) a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLink {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Account linked to an approved registration.
#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub account: ClientAccount,
    /// Present only when a new account was created.
    pub credential: Option<GeneratedCredential>,
}

impl ProvisionedAccount {
    pub fn reused(&self) -> bool {
        self.credential.is_none()
    }
}

/// Creates or reuses client accounts and issues access links.
#[derive(Debug, Clone)]
pub struct Provisioner {
    credential_length: usize,
    access_token_length: usize,
    portal_url: String,
    link_validity: Duration,
}

impl Provisioner {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            credential_length: config.credential_length,
            access_token_length: config.access_token_length,
            portal_url: config.portal_url.trim_end_matches('/').to_string(),
            link_validity: config.access_link_validity(),
        }
    }

    /// Reuse the account registered under the company e-mail unless it holds
    /// elevated privileges; otherwise create a new client account.
    pub fn provision<S: AccountStore + ?Sized>(
        &self,
        store: &S,
        registration: &PendingRegistration,
    ) -> Result<ProvisionedAccount, AccountStoreError> {
        let email = &registration.registrant.company_email;

        let login = match store.find_by_email(email)? {
            Some(existing) if !existing.role.is_privileged() => {
                return reuse(store, registration, existing);
            }
            Some(_privileged) => {
                let login = fallback_login(registration);
                // An earlier attempt may have created it before linking failed.
                if let Some(orphan) = store.find_by_login(&login)? {
                    if !orphan.role.is_privileged() {
                        return reuse(store, registration, orphan);
                    }
                }
                login
            }
            None => email.clone(),
        };

        let profile = profile_for(registration, login, AccountRole::Client);
        let credential = GeneratedCredential::generate(self.credential_length);
        let account = store.create(&profile, &credential)?;
        Ok(ProvisionedAccount {
            account,
            credential: Some(credential),
        })
    }

    pub fn issue_access_link<S: AccountStore + ?Sized>(
        &self,
        store: &S,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<AccessLink, AccountStoreError> {
        let token = random_token(self.access_token_length);
        let link = AccessLink {
            url: format!("{}/access?token={token}", self.portal_url),
            token,
            expires_at: now + self.link_validity,
        };
        store.store_access_link(account, &link)?;
        Ok(link)
    }
}

fn reuse<S: AccountStore + ?Sized>(
    store: &S,
    registration: &PendingRegistration,
    existing: ClientAccount,
) -> Result<ProvisionedAccount, AccountStoreError> {
    let profile = profile_for(registration, existing.login, existing.role);
    store.update_profile(&existing.id, &profile)?;
    Ok(ProvisionedAccount {
        account: ClientAccount {
            id: existing.id,
            login: profile.login,
            email: profile.email,
            display_name: profile.display_name,
            role: profile.role,
        },
        credential: None,
    })
}

fn profile_for(
    registration: &PendingRegistration,
    login: String,
    role: AccountRole,
) -> AccountProfile {
    let registrant = &registration.registrant;
    AccountProfile {
        login,
        email: registrant.company_email.clone(),
        display_name: registrant.display_name(),
        first_name: registrant.contact_first_name.clone(),
        last_name: registrant.contact_last_name.clone(),
        company_name: registrant.company_name.clone(),
        phone: registrant.company_phone.clone(),
        uid_number: registrant.uid_number.clone(),
        address: registrant.address.clone(),
        role,
    }
}

/// Login for a new account whose e-mail already belongs to a privileged user.
fn fallback_login(registration: &PendingRegistration) -> String {
    let email = &registration.registrant.company_email;
    let local = email.split('@').next().unwrap_or(email.as_str());
    format!("{local}-{}", registration.id)
}

fn random_token(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
