//! End-to-end scenarios for client registration: form intake through a
//! versioned field mapping, administrator decisions over HTTP, and the account
//! and notification side effects that follow an approval.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use payroll_desk::config::WorkflowConfig;
    use payroll_desk::workflows::registration::{
        AccessLink, AccountId, AccountProfile, AccountStore, AccountStoreError, ClientAccount,
        Decision, FieldMapping, GeneratedCredential, Notification, NotificationError,
        NotificationSender, PendingRegistration, RegistrationId, RegistrationRepository,
        RegistrationStatus, RegistrationWorkflow, RepositoryError,
    };

    pub(super) type Workflow = RegistrationWorkflow<Registrations, Accounts, Outbox>;

    #[derive(Default)]
    pub(super) struct Registrations {
        records: Mutex<HashMap<RegistrationId, PendingRegistration>>,
    }

    impl RegistrationRepository for Registrations {
        fn insert(
            &self,
            record: PendingRegistration,
        ) -> Result<PendingRegistration, RepositoryError> {
            let mut guard = self.records.lock().expect("registrations mutex poisoned");
            if guard.contains_key(&record.id) {
                return Err(RepositoryError::Conflict);
            }
            guard.insert(record.id.clone(), record.clone());
            Ok(record)
        }

        fn fetch(
            &self,
            id: &RegistrationId,
        ) -> Result<Option<PendingRegistration>, RepositoryError> {
            Ok(self
                .records
                .lock()
                .expect("registrations mutex poisoned")
                .get(id)
                .cloned())
        }

        fn decide(
            &self,
            id: &RegistrationId,
            decision: &Decision,
        ) -> Result<PendingRegistration, RepositoryError> {
            let mut guard = self.records.lock().expect("registrations mutex poisoned");
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
            let mut guard = self.records.lock().expect("registrations mutex poisoned");
            let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
            record.account_id = Some(account.clone());
            Ok(record.clone())
        }

        fn list(
            &self,
            status: Option<RegistrationStatus>,
            limit: usize,
        ) -> Result<Vec<PendingRegistration>, RepositoryError> {
            let guard = self.records.lock().expect("registrations mutex poisoned");
            let mut records: Vec<_> = guard
                .values()
                .filter(|record| status.map_or(true, |status| record.status == status))
                .cloned()
                .collect();
            records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
            records.truncate(limit);
            Ok(records)
        }
    }

    #[derive(Default)]
    pub(super) struct Accounts {
        accounts: Mutex<Vec<(ClientAccount, AccountProfile)>>,
        links: Mutex<Vec<(AccountId, AccessLink)>>,
    }

    impl Accounts {
        pub(super) fn profiles(&self) -> Vec<AccountProfile> {
            self.accounts
                .lock()
                .expect("accounts mutex poisoned")
                .iter()
                .map(|(_, profile)| profile.clone())
                .collect()
        }

        pub(super) fn links(&self) -> Vec<(AccountId, AccessLink)> {
            self.links.lock().expect("links mutex poisoned").clone()
        }
    }

    impl AccountStore for Accounts {
        fn find_by_email(&self, email: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
            Ok(self
                .accounts
                .lock()
                .expect("accounts mutex poisoned")
                .iter()
                .map(|(account, _)| account)
                .find(|account| account.email == email)
                .cloned())
        }

        fn find_by_login(&self, login: &str) -> Result<Option<ClientAccount>, AccountStoreError> {
            Ok(self
                .accounts
                .lock()
                .expect("accounts mutex poisoned")
                .iter()
                .map(|(account, _)| account)
                .find(|account| account.login == login)
                .cloned())
        }

        fn create(
            &self,
            profile: &AccountProfile,
            _credential: &GeneratedCredential,
        ) -> Result<ClientAccount, AccountStoreError> {
            let mut guard = self.accounts.lock().expect("accounts mutex poisoned");
            if guard.iter().any(|(account, _)| account.login == profile.login) {
                return Err(AccountStoreError::LoginTaken(profile.login.clone()));
            }
            let account = ClientAccount {
                id: AccountId(format!("user-{}", guard.len() + 100)),
                login: profile.login.clone(),
                email: profile.email.clone(),
                display_name: profile.display_name.clone(),
                role: profile.role,
            };
            guard.push((account.clone(), profile.clone()));
            Ok(account)
        }

        fn update_profile(
            &self,
            id: &AccountId,
            profile: &AccountProfile,
        ) -> Result<(), AccountStoreError> {
            let mut guard = self.accounts.lock().expect("accounts mutex poisoned");
            let entry = guard
                .iter_mut()
                .find(|(account, _)| &account.id == id)
                .ok_or_else(|| AccountStoreError::NotFound(id.clone()))?;
            entry.1 = profile.clone();
            Ok(())
        }

        fn store_access_link(
            &self,
            id: &AccountId,
            link: &AccessLink,
        ) -> Result<(), AccountStoreError> {
            self.links
                .lock()
                .expect("links mutex poisoned")
                .push((id.clone(), link.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub(super) struct Outbox {
        sent: Mutex<Vec<Notification>>,
    }

    impl Outbox {
        pub(super) fn sent(&self) -> Vec<Notification> {
            self.sent.lock().expect("outbox mutex poisoned").clone()
        }
    }

    impl NotificationSender for Outbox {
        fn send(&self, notification: Notification) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .expect("outbox mutex poisoned")
                .push(notification);
            Ok(())
        }
    }

    pub(super) fn form_mapping() -> FieldMapping {
        let data = include_bytes!("../fixtures/form_mapping.json");
        FieldMapping::from_reader(&data[..]).expect("fixture mapping parses")
    }

    pub(super) fn build() -> (Arc<Workflow>, Arc<Registrations>, Arc<Accounts>, Arc<Outbox>) {
        let registrations = Arc::new(Registrations::default());
        let accounts = Arc::new(Accounts::default());
        let outbox = Arc::new(Outbox::default());
        let config = WorkflowConfig {
            office_email: Some("lohn@kanzlei.example".to_string()),
            portal_url: "https://portal.kanzlei.example".to_string(),
            ..WorkflowConfig::default()
        };
        let workflow = RegistrationWorkflow::new(
            registrations.clone(),
            accounts.clone(),
            outbox.clone(),
            &config,
        )
        .with_field_mapping(form_mapping());
        (Arc::new(workflow), registrations, accounts, outbox)
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use payroll_desk::workflows::registration::{
    registration_router, NotificationTemplate, RegistrationId, RegistrationRepository,
    RegistrationStatus,
};

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 8192)
        .await
        .expect("read body");
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json payload")
    };
    (status, payload)
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn wimmer_form() -> Value {
    json!({
        "submission_id": "gf-entry-5521",
        "fields": {
            "input_1": "Tischlerei  Wimmer OG",
            "input_3": "Buero@Wimmer.example",
            "input_5_3": "Josef",
            "input_5_6": "Wimmer",
            "input_9": "atu 5566 7788",
            "input_11_3": "Linz",
            "input_11_5": "4020",
            "input_42": "not mapped"
        }
    })
}

#[tokio::test]
async fn form_submission_to_approved_client_account() {
    let (workflow, registrations, accounts, outbox) = common::build();
    let router = registration_router(workflow);

    let (status, submitted) = send(&router, post_json("/api/v1/registrations", wimmer_form())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(submitted["company_name"], "Tischlerei Wimmer OG");
    assert_eq!(submitted["company_email"], "buero@wimmer.example");
    let id = submitted["registration_id"]
        .as_str()
        .expect("registration id")
        .to_string();

    let stored = registrations
        .fetch(&RegistrationId(id.clone()))
        .expect("fetch")
        .expect("stored");
    assert_eq!(stored.registrant.uid_number.as_deref(), Some("ATU55667788"));
    assert_eq!(stored.registrant.address.postcode.as_deref(), Some("4020"));

    let (status, pending) = send(
        &router,
        Request::get("/api/v1/registrations?status=pending")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().map(Vec::len), Some(1));

    let (status, approved) = send(
        &router,
        post_json(
            &format!("/api/v1/registrations/{id}/approve"),
            json!({ "actor_id": "office-admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["registration"]["status"], "approved");
    assert_eq!(approved["registration"]["decided_by"], "office-admin");
    assert_eq!(approved["account_created"], true);

    let profiles = accounts.profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].login, "buero@wimmer.example");
    assert_eq!(profiles[0].address.city.as_deref(), Some("Linz"));

    let links = accounts.links();
    assert_eq!(links.len(), 1);
    assert!(links[0]
        .1
        .url
        .starts_with("https://portal.kanzlei.example/access?token="));

    let templates: Vec<NotificationTemplate> =
        outbox.sent().iter().map(|notice| notice.template).collect();
    assert_eq!(
        templates,
        vec![
            NotificationTemplate::RegistrationReceived,
            NotificationTemplate::ApprovedNewAccount
        ]
    );

    let (status, conflict) = send(
        &router,
        post_json(
            &format!("/api/v1/registrations/{id}/approve"),
            json!({ "actor_id": "second-admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["status"], "approved");
    assert_eq!(accounts.profiles().len(), 1);
}

#[tokio::test]
async fn rejected_registration_never_gets_an_account() {
    let (workflow, registrations, accounts, outbox) = common::build();
    let router = registration_router(workflow);

    let (_, submitted) = send(&router, post_json("/api/v1/registrations", wimmer_form())).await;
    let id = submitted["registration_id"]
        .as_str()
        .expect("registration id")
        .to_string();

    let (status, rejected) = send(
        &router,
        post_json(
            &format!("/api/v1/registrations/{id}/reject"),
            json!({ "actor_id": "office-admin", "reason": "not a payroll client" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["registration"]["rejection_reason"], "not a payroll client");

    let (status, _) = send(
        &router,
        post_json(
            &format!("/api/v1/registrations/{id}/approve"),
            json!({ "actor_id": "office-admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stored = registrations
        .fetch(&RegistrationId(id))
        .expect("fetch")
        .expect("stored");
    assert_eq!(stored.status, RegistrationStatus::Rejected);
    assert!(accounts.profiles().is_empty());
    assert_eq!(
        outbox.sent().last().map(|notice| notice.template),
        Some(NotificationTemplate::RegistrationRejected)
    );
}

#[tokio::test]
async fn form_without_company_email_is_unprocessable() {
    let (workflow, registrations, _, outbox) = common::build();
    let router = registration_router(workflow);

    let (status, body) = send(
        &router,
        post_json(
            "/api/v1/registrations",
            json!({ "fields": { "input_1": "Wimmer OG" } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().is_some());
    assert!(registrations.list(None, 10).expect("list").is_empty());
    assert!(outbox.sent().is_empty());
}
