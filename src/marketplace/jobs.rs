use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    Application, ApplicationStatus, Caller, Feedback, Job, JobCompletion, JobFilter, JobId,
    JobSpec, JobStatus, Role, User, UserId,
};
use super::error::{required, MarketplaceError};
use super::events::{emit_best_effort, EventSink, MarketplaceEvent};
use super::matching::{filter_jobs, match_jobs, normalize_skills};
use super::store::{retry_on_conflict, ChangeSet, MarketplaceStore};
use crate::config::MarketplaceConfig;

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    JobId(format!("job-{id:06}"))
}

const MIN_RATING: u8 = 1;
const MAX_RATING: u8 = 5;

/// Posts jobs and drives them forward: open, then assigned (via selection), then completed.
pub struct JobLifecycleService<S, E> {
    store: Arc<S>,
    events: Arc<E>,
    config: MarketplaceConfig,
}

impl<S, E> JobLifecycleService<S, E>
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<E>, config: MarketplaceConfig) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    pub fn post_job(&self, caller: &Caller, spec: JobSpec) -> Result<Job, MarketplaceError> {
        caller.require(Role::Provider, "post jobs")?;
        let provider = self.party(&caller.user_id, Role::Provider)?;

        let job = Job {
            id: next_job_id(),
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            title: required("title", &spec.title)?,
            description: required("description", &spec.description)?,
            location: required("location", &spec.location)?,
            category: required("category", &spec.category)?,
            required_skills: normalize_skills(&spec.required_skills),
            payment: required("payment", &spec.payment)?,
            duration: required("duration", &spec.duration)?,
            status: JobStatus::Open,
            applicant_count: 0,
            assigned_seeker_id: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 0,
        };

        let committed = self.store.commit(ChangeSet::new().insert_job(job.clone()))?;
        let job = committed.job(&job.id).cloned().unwrap_or(job);
        info!(job_id = %job.id, provider_id = %job.provider_id, "job posted");

        emit_best_effort(
            self.events.as_ref(),
            MarketplaceEvent::JobPosted { job: job.clone() },
        );
        Ok(job)
    }

    /// Close out an assigned job, attach feedback to the winning application and refresh the
    /// counterparty's average rating, all in one commit.
    pub fn complete_job(
        &self,
        caller: &Caller,
        job_id: &JobId,
        completion: JobCompletion,
    ) -> Result<Job, MarketplaceError> {
        let rating = u8::try_from(completion.rating)
            .ok()
            .filter(|rating| (MIN_RATING..=MAX_RATING).contains(rating))
            .ok_or_else(|| {
                MarketplaceError::validation(format!(
                    "rating must be between {MIN_RATING} and {MAX_RATING}, got {}",
                    completion.rating
                ))
            })?;
        let comment = required("feedback", &completion.feedback)?;

        let (job, application, completed_by) =
            retry_on_conflict(self.config.commit_attempts, "complete_job", || {
                let mut job = self.job(job_id)?;
                if !job.status.can_advance_to(JobStatus::Completed) {
                    return Err(MarketplaceError::invalid_state(format!(
                        "job '{}' is {}; only assigned jobs can be completed",
                        job.id, job.status
                    )));
                }
                if !job.is_party(&caller.user_id) {
                    return Err(MarketplaceError::permission_denied(
                        "only the job's provider or its assigned seeker can complete it",
                    ));
                }
                let completed_by = if job.provider_id == caller.user_id {
                    Role::Provider
                } else {
                    Role::Seeker
                };

                let mut winner = self.selected_application(&job)?;
                let now = Utc::now();
                winner.feedback = Some(Feedback {
                    rating,
                    comment: comment.clone(),
                    given_by: caller.user_id.clone(),
                    author_role: completed_by,
                    given_at: now,
                });
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);

                let rated = self.rerated_counterparty(&job, &winner, completed_by)?;

                let mut changes = ChangeSet::new()
                    .update_job(job.clone())
                    .update_application(winner.clone());
                if let Some(user) = rated {
                    changes = changes.update_user(user);
                }

                let committed = self.store.commit(changes)?;
                let job = committed.job(&job.id).cloned().unwrap_or(job);
                let winner = committed
                    .application(&winner.id)
                    .cloned()
                    .unwrap_or(winner);
                Ok((job, winner, completed_by))
            })?;

        info!(
            job_id = %job.id,
            application_id = %application.id,
            completed_by = %completed_by,
            "job completed"
        );

        emit_best_effort(
            self.events.as_ref(),
            MarketplaceEvent::JobCompleted {
                job: job.clone(),
                application,
                completed_by,
            },
        );
        Ok(job)
    }

    pub fn job(&self, id: &JobId) -> Result<Job, MarketplaceError> {
        self.store
            .job(id)?
            .ok_or_else(|| MarketplaceError::not_found("job", id))
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, MarketplaceError> {
        Ok(filter_jobs(self.store.jobs()?, filter))
    }

    pub fn list_provider_jobs(&self, caller: &Caller) -> Result<Vec<Job>, MarketplaceError> {
        caller.require(Role::Provider, "list their posted jobs")?;
        Ok(self.store.jobs_by_provider(&caller.user_id)?)
    }

    /// Open jobs sharing at least one skill with the calling seeker.
    pub fn list_matching_jobs(&self, caller: &Caller) -> Result<Vec<Job>, MarketplaceError> {
        caller.require(Role::Seeker, "list matching jobs")?;
        let seeker = self.party(&caller.user_id, Role::Seeker)?;
        let open = filter_jobs(
            self.store.jobs()?,
            &JobFilter {
                status: Some(JobStatus::Open),
                ..JobFilter::default()
            },
        );
        Ok(match_jobs(&seeker.skills, open))
    }

    fn party(&self, id: &UserId, role: Role) -> Result<User, MarketplaceError> {
        let user = self
            .store
            .user(id)?
            .ok_or_else(|| MarketplaceError::not_found("user", id))?;
        if user.role != role {
            return Err(MarketplaceError::permission_denied(format!(
                "user '{}' is registered as a {}",
                user.id, user.role
            )));
        }
        Ok(user)
    }

    fn selected_application(&self, job: &Job) -> Result<Application, MarketplaceError> {
        let seeker = job.assigned_seeker_id.as_ref().ok_or_else(|| {
            MarketplaceError::invalid_state(format!("job '{}' has no assigned seeker", job.id))
        })?;

        self.store
            .applications_for_job(&job.id)?
            .into_iter()
            .find(|application| {
                application.status == ApplicationStatus::Selected
                    && &application.seeker_id == seeker
            })
            .ok_or_else(|| {
                MarketplaceError::invalid_state(format!(
                    "job '{}' has no selected application",
                    job.id
                ))
            })
    }

    /// Recomputes the rating of whoever the feedback is about. Returns `None` when that user is
    /// no longer on record.
    fn rerated_counterparty(
        &self,
        job: &Job,
        winner: &Application,
        completed_by: Role,
    ) -> Result<Option<User>, MarketplaceError> {
        let (subject, ratings) = match completed_by {
            Role::Provider => {
                let ratings: Vec<u8> = self
                    .store
                    .applications_for_seeker(&winner.seeker_id)?
                    .into_iter()
                    .map(|application| {
                        if application.id == winner.id {
                            winner.clone()
                        } else {
                            application
                        }
                    })
                    .filter_map(|application| application.feedback)
                    .filter(|feedback| feedback.author_role == Role::Provider)
                    .map(|feedback| feedback.rating)
                    .collect();
                (&winner.seeker_id, ratings)
            }
            Role::Seeker => {
                let mut ratings = Vec::new();
                for posted in self.store.jobs_by_provider(&job.provider_id)? {
                    if posted.id == job.id {
                        ratings.extend(seeker_authored(winner));
                        continue;
                    }
                    if posted.status != JobStatus::Completed {
                        continue;
                    }
                    for application in self.store.applications_for_job(&posted.id)? {
                        ratings.extend(seeker_authored(&application));
                    }
                }
                (&job.provider_id, ratings)
            }
        };

        let Some(mut user) = self.store.user(subject)? else {
            return Ok(None);
        };
        user.rating = average(&ratings);
        Ok(Some(user))
    }
}

fn seeker_authored(application: &Application) -> Option<u8> {
    application
        .feedback
        .as_ref()
        .filter(|feedback| feedback.author_role == Role::Seeker)
        .map(|feedback| feedback.rating)
}

fn average(ratings: &[u8]) -> f32 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: u32 = ratings.iter().map(|rating| u32::from(*rating)).sum();
    total as f32 / ratings.len() as f32
}
