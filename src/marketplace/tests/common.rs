use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::config::MarketplaceConfig;
use crate::marketplace::domain::{
    Application, ApplicationId, Caller, Job, JobCompletion, JobId, JobSpec, NewUser, Role, User,
    UserId,
};
use crate::marketplace::events::{EmitError, EventSink, MarketplaceEvent};
use crate::marketplace::notifications::{InMemoryNotifications, NotificationEmitter};
use crate::marketplace::store::{ChangeSet, Committed, InMemoryStore, MarketplaceStore, StoreError};
use crate::marketplace::users::UserService;
use crate::marketplace::{marketplace_router, Marketplace};

pub(super) type TestMarketplace = Marketplace<InMemoryStore, RecordingSink, InMemoryNotifications>;

pub(super) type NotifyingMarketplace = Marketplace<
    InMemoryStore,
    NotificationEmitter<InMemoryStore, InMemoryNotifications>,
    InMemoryNotifications,
>;

pub(super) fn build_marketplace() -> (TestMarketplace, Arc<InMemoryStore>, Arc<RecordingSink>) {
    let store = Arc::new(InMemoryStore::new());
    let events = Arc::new(RecordingSink::default());
    let marketplace = Marketplace::new(
        store.clone(),
        events.clone(),
        Arc::new(InMemoryNotifications::new()),
        MarketplaceConfig::default(),
    );
    (marketplace, store, events)
}

/// Marketplace whose events feed the notification emitter synchronously.
pub(super) fn build_notifying_marketplace() -> (NotifyingMarketplace, Arc<InMemoryNotifications>) {
    let store = Arc::new(InMemoryStore::new());
    let notifications = Arc::new(InMemoryNotifications::new());
    let emitter = Arc::new(NotificationEmitter::new(
        store.clone(),
        notifications.clone(),
    ));
    let marketplace = Marketplace::new(
        store,
        emitter,
        notifications.clone(),
        MarketplaceConfig::default(),
    );
    (marketplace, notifications)
}

pub(super) fn register_provider<S>(users: &UserService<S>, name: &str) -> Caller
where
    S: MarketplaceStore + 'static,
{
    let user = users
        .register(NewUser {
            name: name.to_string(),
            role: Role::Provider,
            location: "Arusha".to_string(),
            bio: "Family farm on the ridge".to_string(),
            skills: Vec::new(),
            email: None,
            phone: Some("+255 700 000 001".to_string()),
        })
        .expect("provider registers");
    Caller::new(user.id.0, Role::Provider)
}

pub(super) fn register_seeker<S>(users: &UserService<S>, name: &str, skills: &[&str]) -> Caller
where
    S: MarketplaceStore + 'static,
{
    let user = users
        .register(NewUser {
            name: name.to_string(),
            role: Role::Seeker,
            location: "Arusha".to_string(),
            bio: "Five seasons of harvest work".to_string(),
            skills: skills.iter().map(|skill| skill.to_string()).collect(),
            email: None,
            phone: None,
        })
        .expect("seeker registers");
    Caller::new(user.id.0, Role::Seeker)
}

pub(super) fn job_spec(title: &str, skills: &[&str]) -> JobSpec {
    JobSpec {
        title: title.to_string(),
        description: format!("{title} on the lower field"),
        location: "Arusha".to_string(),
        category: "agriculture".to_string(),
        required_skills: skills.iter().map(|skill| skill.to_string()).collect(),
        payment: "15000 TSh".to_string(),
        duration: "3 days".to_string(),
    }
}

pub(super) fn completion(rating: i64, feedback: &str) -> JobCompletion {
    JobCompletion {
        rating,
        feedback: feedback.to_string(),
    }
}

pub(super) fn router_for(marketplace: NotifyingMarketplace) -> axum::Router {
    marketplace_router(Arc::new(marketplace))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Arc<Mutex<Vec<MarketplaceEvent>>>,
}

impl RecordingSink {
    pub(super) fn events(&self) -> Vec<MarketplaceEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(MarketplaceEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MarketplaceEvent) -> Result<(), EmitError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct ClosedSink;

impl EventSink for ClosedSink {
    fn emit(&self, _event: MarketplaceEvent) -> Result<(), EmitError> {
        Err(EmitError::Closed)
    }
}

pub(super) struct UnavailableStore;

fn offline() -> StoreError {
    StoreError::Unavailable("database offline".to_string())
}

impl MarketplaceStore for UnavailableStore {
    fn user(&self, _id: &UserId) -> Result<Option<User>, StoreError> {
        Err(offline())
    }

    fn users_by_role(&self, _role: Role) -> Result<Vec<User>, StoreError> {
        Err(offline())
    }

    fn job(&self, _id: &JobId) -> Result<Option<Job>, StoreError> {
        Err(offline())
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        Err(offline())
    }

    fn jobs_by_provider(&self, _provider: &UserId) -> Result<Vec<Job>, StoreError> {
        Err(offline())
    }

    fn application(&self, _id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Err(offline())
    }

    fn applications_for_job(&self, _job: &JobId) -> Result<Vec<Application>, StoreError> {
        Err(offline())
    }

    fn applications_for_seeker(&self, _seeker: &UserId) -> Result<Vec<Application>, StoreError> {
        Err(offline())
    }

    fn application_for(
        &self,
        _job: &JobId,
        _seeker: &UserId,
    ) -> Result<Option<Application>, StoreError> {
        Err(offline())
    }

    fn commit(&self, _changes: ChangeSet) -> Result<Committed, StoreError> {
        Err(offline())
    }
}

/// Delegates to an in-memory store but leaves one application out of the per-job index.
pub(super) struct UnindexedApplicationStore {
    pub(super) inner: InMemoryStore,
    pub(super) hidden: Mutex<Option<ApplicationId>>,
}

impl UnindexedApplicationStore {
    pub(super) fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            hidden: Mutex::new(None),
        }
    }

    pub(super) fn hide(&self, id: &ApplicationId) {
        *self.hidden.lock().expect("hidden lock") = Some(id.clone());
    }
}

impl MarketplaceStore for UnindexedApplicationStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        self.inner.users_by_role(role)
    }

    fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.inner.job(id)
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.jobs()
    }

    fn jobs_by_provider(&self, provider: &UserId) -> Result<Vec<Job>, StoreError> {
        self.inner.jobs_by_provider(provider)
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        self.inner.application(id)
    }

    fn applications_for_job(&self, job: &JobId) -> Result<Vec<Application>, StoreError> {
        let hidden = self.hidden.lock().expect("hidden lock").clone();
        Ok(self
            .inner
            .applications_for_job(job)?
            .into_iter()
            .filter(|application| Some(&application.id) != hidden.as_ref())
            .collect())
    }

    fn applications_for_seeker(&self, seeker: &UserId) -> Result<Vec<Application>, StoreError> {
        self.inner.applications_for_seeker(seeker)
    }

    fn application_for(
        &self,
        job: &JobId,
        seeker: &UserId,
    ) -> Result<Option<Application>, StoreError> {
        self.inner.application_for(job, seeker)
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        self.inner.commit(changes)
    }
}
