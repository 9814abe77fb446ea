use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::workflows::registration::domain::{
    AccountId, Address, Decision, PendingRegistration, RegistrantData, RegistrationId,
    RegistrationStatus,
};
use crate::workflows::registration::intake::FormSubmission;
use crate::workflows::registration::provisioning::{
    AccessLink, AccountProfile, AccountRole, AccountStore, AccountStoreError, ClientAccount,
    GeneratedCredential,
};
use crate::workflows::registration::repository::{
    Notification, NotificationError, NotificationSender, RegistrationRepository, RepositoryError,
};
use crate::workflows::registration::{registration_router, RegistrationWorkflow};

pub(super) type TestWorkflow = RegistrationWorkflow<MemoryRepository, MemoryAccounts, MemoryNotifications>;

pub(super) fn workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        office_email: None,
        portal_url: "https://portal.example.at/".to_string(),
        ..WorkflowConfig::default()
    }
}

pub(super) fn registrant() -> RegistrantData {
    RegistrantData {
        company_name: "  Bäckerei   Huber GmbH ".to_string(),
        company_email: "Office@Huber.AT".to_string(),
        contact_first_name: Some("Maria".to_string()),
        contact_last_name: Some("Huber".to_string()),
        contact_email: None,
        company_phone: Some("+43 1 234 56 78".to_string()),
        uid_number: Some("atu 1234 5678".to_string()),
        address: Address {
            street: Some("Hauptstraße 1".to_string()),
            postcode: Some("1010".to_string()),
            city: Some("Wien".to_string()),
            country: Some("AT".to_string()),
        },
    }
}

pub(super) fn form_submission() -> FormSubmission {
    let mut fields = BTreeMap::new();
    fields.insert("company_name".to_string(), "Bäckerei Huber GmbH".to_string());
    fields.insert("company_email".to_string(), "office@huber.at".to_string());
    fields.insert("contact_first_name".to_string(), "Maria".to_string());
    fields.insert("city".to_string(), "Wien".to_string());
    FormSubmission {
        submission_id: None,
        fields,
    }
}

pub(super) fn build_workflow() -> (
    TestWorkflow,
    Arc<MemoryRepository>,
    Arc<MemoryAccounts>,
    Arc<MemoryNotifications>,
) {
    build_workflow_with(workflow_config(), MemoryAccounts::default())
}

pub(super) fn build_workflow_with(
    config: WorkflowConfig,
    accounts: MemoryAccounts,
) -> (
    TestWorkflow,
    Arc<MemoryRepository>,
    Arc<MemoryAccounts>,
    Arc<MemoryNotifications>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let accounts = Arc::new(accounts);
    let notifications = Arc::new(MemoryNotifications::default());
    let workflow = RegistrationWorkflow::new(
        repository.clone(),
        accounts.clone(),
        notifications.clone(),
        &config,
    );
    (workflow, repository, accounts, notifications)
}

pub(super) fn router_with_workflow(workflow: TestWorkflow) -> axum::Router {
    registration_router(Arc::new(workflow))
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<RegistrationId, PendingRegistration>>>,
    fail_next_link: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub(super) fn fail_next_link(&self) {
        self.fail_next_link.store(true, Ordering::SeqCst);
    }
}

impl RegistrationRepository for MemoryRepository {
    fn insert(
        &self,
        record: PendingRegistration,
    ) -> Result<PendingRegistration, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &RegistrationId) -> Result<Option<PendingRegistration>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn decide(
        &self,
        id: &RegistrationId,
        decision: &Decision,
    ) -> Result<PendingRegistration, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
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
        if self.fail_next_link.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("link write timed out".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
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
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<PendingRegistration> = guard
            .values()
            .filter(|record| status.map_or(true, |status| record.status == status))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records.truncate(limit);
        Ok(records)
    }
}

#[derive(Default)]
pub(super) struct MemoryAccounts {
    accounts: Mutex<Vec<ClientAccount>>,
    profiles: Mutex<HashMap<AccountId, AccountProfile>>,
    links: Mutex<HashMap<AccountId, AccessLink>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl MemoryAccounts {
    pub(super) fn with_account(self, login: &str, email: &str, role: AccountRole) -> Self {
        let mut accounts = self.accounts.lock().expect("accounts mutex poisoned");
        let id = AccountId(format!("acct-{}", accounts.len() + 1));
        accounts.push(ClientAccount {
            id,
            login: login.to_string(),
            email: email.to_string(),
            display_name: login.to_string(),
            role,
        });
        drop(accounts);
        self
    }

    pub(super) fn failing_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    pub(super) fn restore(&self) {
        self.fail_create.store(false, Ordering::SeqCst);
    }

    pub(super) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(super) fn profile(&self, id: &AccountId) -> Option<AccountProfile> {
        self.profiles
            .lock()
            .expect("profiles mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn link(&self, id: &AccountId) -> Option<AccessLink> {
        self.links
            .lock()
            .expect("links mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl AccountStore for MemoryAccounts {
    fn find_by_email(&self, email: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
        let accounts = self.accounts.lock().expect("accounts mutex poisoned");
        Ok(accounts
            .iter()
            .find(|account| account.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn find_by_login(&self, login: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
        let accounts = self.accounts.lock().expect("accounts mutex poisoned");
        Ok(accounts.iter().find(|account| account.login == login).cloned())
    }

    fn create(
        &self,
        profile: &AccountProfile,
        credential: &GeneratedCredential,
    ) -> Result<ClientAccount, AccountStoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AccountStoreError::Unavailable("directory offline".to_string()));
        }
        assert!(!credential.expose().is_empty());

        let mut accounts = self.accounts.lock().expect("accounts mutex poisoned");
        if accounts.iter().any(|account| account.login == profile.login) {
            return Err(AccountStoreError::LoginTaken(profile.login.clone()));
        }
        let account = ClientAccount {
            id: AccountId(format!("acct-{}", accounts.len() + 1)),
            login: profile.login.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            role: profile.role,
        };
        accounts.push(account.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .expect("profiles mutex poisoned")
            .insert(account.id.clone(), profile.clone());
        Ok(account)
    }

    fn update_profile(
        &self,
        id: &AccountId,
        profile: &AccountProfile,
    ) -> Result<(), AccountStoreError> {
        self.profiles
            .lock()
            .expect("profiles mutex poisoned")
            .insert(id.clone(), profile.clone());
        Ok(())
    }

    fn store_access_link(&self, id: &AccountId, link: &AccessLink) -> Result<(), AccountStoreError> {
        self.links
            .lock()
            .expect("links mutex poisoned")
            .insert(id.clone(), link.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    events: Mutex<Vec<Notification>>,
    offline: AtomicBool,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }

    pub(super) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

impl NotificationSender for MemoryNotifications {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
