use metrics_exporter_prometheus::PrometheusHandle;
use payroll_desk::config::WorkflowConfig;
use payroll_desk::error::AppError;
use payroll_desk::workflows::employees::{
    DirectoryError, EmployeeDirectory, EmployeeId, EmployeeRecord,
};
use payroll_desk::workflows::registration::{
    AccessLink, AccountId, AccountProfile, AccountStore, AccountStoreError, ClientAccount,
    Decision, FieldMapping, GeneratedCredential, Notification, NotificationError,
    NotificationSender, PendingRegistration, RegistrationId, RegistrationRepository,
    RegistrationStatus, RepositoryError,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, store: &str) -> Result<MutexGuard<'a, T>, String> {
    mutex
        .lock()
        .map_err(|_| format!("{store} lock poisoned"))
}

/// Record store holding registrations for the lifetime of the process.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRegistrationRepository {
    records: Arc<Mutex<HashMap<RegistrationId, PendingRegistration>>>,
}

impl InMemoryRegistrationRepository {
    fn guard(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<RegistrationId, PendingRegistration>>, RepositoryError> {
        lock(&self.records, "registration store").map_err(RepositoryError::Unavailable)
    }
}

impl RegistrationRepository for InMemoryRegistrationRepository {
    fn insert(
        &self,
        record: PendingRegistration,
    ) -> Result<PendingRegistration, RepositoryError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &RegistrationId) -> Result<Option<PendingRegistration>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn decide(
        &self,
        id: &RegistrationId,
        decision: &Decision,
    ) -> Result<PendingRegistration, RepositoryError> {
        let mut guard = self.guard()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record
            .apply(decision)
            .map_err(|conflict| RepositoryError::StatusConflict {
                current: conflict.current,
            })?;
        Ok(record.clone())
    }

    fn link_account(
        &self,
        id: &RegistrationId,
        account: &AccountId,
    ) -> Result<PendingRegistration, RepositoryError> {
        let mut guard = self.guard()?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !record.awaiting_provisioning() {
            return Err(RepositoryError::StatusConflict {
                current: record.status,
            });
        }
        record.account_id = Some(account.clone());
        Ok(record.clone())
    }

    fn list(
        &self,
        status: Option<RegistrationStatus>,
        limit: usize,
    ) -> Result<Vec<PendingRegistration>, RepositoryError> {
        let guard = self.guard()?;
        let mut records: Vec<PendingRegistration> = guard
            .values()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records.truncate(limit);
        Ok(records)
    }
}

/// Stand-in for the external account directory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAccountStore {
    accounts: Arc<Mutex<Vec<ClientAccount>>>,
    access_links: Arc<Mutex<HashMap<AccountId, AccessLink>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryAccountStore {
    fn guard(&self) -> Result<MutexGuard<'_, Vec<ClientAccount>>, AccountStoreError> {
        lock(&self.accounts, "account store").map_err(AccountStoreError::Unavailable)
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, account: ClientAccount) {
        self.accounts
            .lock()
            .expect("account mutex poisoned")
            .push(account);
    }
}

impl AccountStore for InMemoryAccountStore {
    fn find_by_email(&self, email: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
        Ok(self
            .guard()?
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn find_by_login(&self, login: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
        Ok(self
            .guard()?
            .iter()
            .find(|account| account.login == login)
            .cloned())
    }

    fn create(
        &self,
        profile: &AccountProfile,
        _credential: &GeneratedCredential,
    ) -> Result<ClientAccount, AccountStoreError> {
        let mut guard = self.guard()?;
        if guard.iter().any(|account| account.login == profile.login) {
            return Err(AccountStoreError::LoginTaken(profile.login.clone()));
        }

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let account = ClientAccount {
            id: AccountId(format!("acct-{id:06}")),
            login: profile.login.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            role: profile.role,
        };
        guard.push(account.clone());
        Ok(account)
    }

    fn update_profile(
        &self,
        id: &AccountId,
        profile: &AccountProfile,
    ) -> Result<(), AccountStoreError> {
        let mut guard = self.guard()?;
        let account = guard
            .iter_mut()
            .find(|account| &account.id == id)
            .ok_or_else(|| AccountStoreError::NotFound(id.clone()))?;
        account.display_name = profile.display_name.clone();
        account.email = profile.email.clone();
        Ok(())
    }

    fn store_access_link(
        &self,
        id: &AccountId,
        link: &AccessLink,
    ) -> Result<(), AccountStoreError> {
        if !self.guard()?.iter().any(|account| &account.id == id) {
            return Err(AccountStoreError::NotFound(id.clone()));
        }
        let replaced = lock(&self.access_links, "access link store")
            .map_err(AccountStoreError::Unavailable)?
            .insert(id.clone(), link.clone())
            .is_some();
        debug!(account_id = %id, replaced, expires_at = %link.expires_at, "access link stored");
        Ok(())
    }
}

/// Writes notifications to the log instead of a mail relay. Secrets in the
/// details map are never logged.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSender;

impl NotificationSender for LoggingNotificationSender {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotificationError::Recipient(
                "empty recipient address".to_string(),
            ));
        }
        let fields: Vec<&str> = notification.details.keys().map(String::as_str).collect();
        info!(
            recipient = %notification.recipient,
            template = notification.template.label(),
            registration_id = %notification.registration_id,
            ?fields,
            "notification queued"
        );
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryEmployeeDirectory {
    records: Arc<Mutex<HashMap<EmployeeId, EmployeeRecord>>>,
}

impl InMemoryEmployeeDirectory {
    fn guard(&self) -> Result<MutexGuard<'_, HashMap<EmployeeId, EmployeeRecord>>, RepositoryError> {
        lock(&self.records, "employee directory").map_err(RepositoryError::Unavailable)
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn insert(&self, record: EmployeeRecord) -> Result<EmployeeRecord, DirectoryError> {
        let mut guard = self.guard()?;
        number_free(&guard, &record)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict.into());
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: EmployeeRecord) -> Result<EmployeeRecord, DirectoryError> {
        let mut guard = self.guard()?;
        number_free(&guard, &record)?;
        if !guard.contains_key(&record.id) {
            return Err(RepositoryError::NotFound.into());
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError> {
        Ok(self.guard()?.get(id).cloned())
    }
}

fn number_free(
    records: &HashMap<EmployeeId, EmployeeRecord>,
    record: &EmployeeRecord,
) -> Result<(), DirectoryError> {
    match records.values().find(|stored| stored.shares_number_with(record)) {
        Some(holder) => Err(DirectoryError::NumberTaken(holder.id.clone())),
        None => Ok(()),
    }
}

/// Field mapping from `APP_FORM_MAPPING`, or the built-in table.
pub(crate) fn load_field_mapping(config: &WorkflowConfig) -> Result<FieldMapping, AppError> {
    match &config.form_mapping_path {
        Some(path) => {
            let file = File::open(path)?;
            let mapping = FieldMapping::from_reader(BufReader::new(file))?;
            info!(path = %path.display(), version = mapping.version, "form field mapping loaded");
            Ok(mapping)
        }
        None => Ok(FieldMapping::standard()),
    }
}
