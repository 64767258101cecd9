//! Village job marketplace: providers post jobs, seekers apply, providers select one applicant and
//! either party closes the job out with feedback.

mod applications;
mod cache;
mod domain;
mod error;
mod events;
mod jobs;
pub mod matching;
mod notifications;
mod router;
pub mod store;
mod users;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use applications::{ApplicationService, ApplyOutcome, Selection};
pub use cache::{CacheStats, CachedStore};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, Caller, Feedback, Job, JobCompletion,
    JobFilter, JobId, JobSpec, JobStatus, NewUser, Notification, NotificationId,
    NotificationKind, ProfileUpdate, Role, SeekerSnapshot, User, UserId,
};
pub use error::MarketplaceError;
pub use events::{spawn_dispatcher, ChannelEventSink, EmitError, EventSink, MarketplaceEvent};
pub use jobs::JobLifecycleService;
pub use notifications::{
    InMemoryNotifications, NotificationEmitter, NotificationRepository, NotificationService,
};
pub use router::{caller_from_headers, marketplace_router, USER_ID_HEADER, USER_ROLE_HEADER};
pub use store::{InMemoryStore, MarketplaceStore, StoreError};
pub use users::UserService;

use crate::config::MarketplaceConfig;

/// Every marketplace operation behind one handle, sharing a store, an event sink and the
/// notification feed.
pub struct Marketplace<S, E, N> {
    pub users: UserService<S>,
    pub jobs: JobLifecycleService<S, E>,
    pub applications: ApplicationService<S, E>,
    pub notifications: NotificationService<N>,
}

impl<S, E, N> Marketplace<S, E, N>
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    pub fn new(
        store: Arc<S>,
        events: Arc<E>,
        notifications: Arc<N>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            users: UserService::new(store.clone(), config),
            jobs: JobLifecycleService::new(store.clone(), events.clone(), config),
            applications: ApplicationService::new(store, events, config),
            notifications: NotificationService::new(notifications),
        }
    }
}
