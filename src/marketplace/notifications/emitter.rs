use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::NotificationRepository;
use crate::marketplace::domain::{
    Job, Notification, NotificationId, NotificationKind, Role, UserId,
};
use crate::marketplace::events::{EmitError, EventSink, MarketplaceEvent};
use crate::marketplace::matching;
use crate::marketplace::store::MarketplaceStore;

static NOTIFICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_notification_id() -> NotificationId {
    let id = NOTIFICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    NotificationId(format!("ntf-{id:06}"))
}

/// Turns transition events into per-user notification records.
pub struct NotificationEmitter<S, N> {
    store: Arc<S>,
    notifications: Arc<N>,
}

impl<S, N> NotificationEmitter<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationRepository + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<N>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    fn drafts(&self, event: &MarketplaceEvent) -> Result<Vec<Notification>, EmitError> {
        let drafts = match event {
            MarketplaceEvent::JobPosted { job } => {
                let seekers = self
                    .store
                    .users_by_role(Role::Seeker)
                    .map_err(|err| EmitError::Delivery {
                        failed: 1,
                        reason: err.to_string(),
                    })?;
                matching::matching_seekers(&job.required_skills, &seekers)
                    .into_iter()
                    .map(|seeker| {
                        draft(
                            &seeker.id,
                            NotificationKind::NewMatchingJob,
                            "New Job Match",
                            format!(
                                "A new job matching your skills has been posted: {}",
                                job.title
                            ),
                        )
                    })
                    .collect()
            }
            MarketplaceEvent::ApplicationSubmitted { job, application } => vec![draft(
                &job.provider_id,
                NotificationKind::NewApplication,
                "New Application",
                format!(
                    "{} has applied for your job: {}",
                    application.seeker_name, job.title
                ),
            )],
            MarketplaceEvent::ApplicantSelected {
                job, application, ..
            } => vec![draft(
                &application.seeker_id,
                NotificationKind::JobSelected,
                "Job Offer",
                format!("You've been selected for the job: {}", job.title),
            )],
            MarketplaceEvent::JobCompleted {
                job,
                application,
                completed_by,
            } => match &application.feedback {
                Some(feedback) => vec![draft(
                    &counterparty(job, &application.seeker_id, *completed_by),
                    NotificationKind::JobFeedback,
                    "Job Feedback",
                    format!(
                        "You received a {}-star rating for the job: {}. Feedback: {}",
                        feedback.rating, job.title, feedback.comment
                    ),
                )],
                None => Vec::new(),
            },
        };
        Ok(drafts)
    }
}

fn draft(
    recipient: &UserId,
    kind: NotificationKind,
    title: &str,
    message: String,
) -> Notification {
    Notification {
        id: next_notification_id(),
        recipient: recipient.clone(),
        kind,
        title: title.to_string(),
        message,
        read: false,
        timestamp: Utc::now(),
    }
}

fn counterparty(job: &Job, seeker: &UserId, completed_by: Role) -> UserId {
    match completed_by {
        Role::Provider => seeker.clone(),
        Role::Seeker => job.provider_id.clone(),
    }
}

impl<S, N> EventSink for NotificationEmitter<S, N>
where
    S: MarketplaceStore + 'static,
    N: NotificationRepository + 'static,
{
    fn emit(&self, event: MarketplaceEvent) -> Result<(), EmitError> {
        let drafts = self.drafts(&event)?;
        let total = drafts.len();
        let mut failures = Vec::new();

        for notification in drafts {
            if let Err(err) = self.notifications.insert(notification) {
                failures.push(err.to_string());
            }
        }

        info!(
            event = event.name(),
            delivered = total - failures.len(),
            "notifications recorded"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EmitError::Delivery {
                failed: failures.len(),
                reason: failures.join("; "),
            })
        }
    }
}
