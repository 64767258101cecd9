use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Caller, Job, JobId, JobStatus, Role,
    SeekerSnapshot, User, UserId,
};
use super::error::MarketplaceError;
use super::events::{emit_best_effort, EventSink, MarketplaceEvent};
use super::store::{retry_on_conflict, ChangeSet, MarketplaceStore};
use crate::config::MarketplaceConfig;

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Result of `apply_for_job`. A repeat application is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "application", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created(Application),
    Duplicate(Application),
}

impl ApplyOutcome {
    pub fn application(&self) -> &Application {
        match self {
            ApplyOutcome::Created(application) | ApplyOutcome::Duplicate(application) => {
                application
            }
        }
    }

    pub fn into_application(self) -> Application {
        match self {
            ApplyOutcome::Created(application) | ApplyOutcome::Duplicate(application) => {
                application
            }
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate(_))
    }
}

/// State after a successful selection cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub application: Application,
    pub job: Job,
    pub rejected: Vec<Application>,
}

/// Files applications and runs the select/reject cascade.
pub struct ApplicationService<S, E> {
    store: Arc<S>,
    events: Arc<E>,
    config: MarketplaceConfig,
}

impl<S, E> ApplicationService<S, E>
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

    pub fn apply_for_job(
        &self,
        caller: &Caller,
        job_id: &JobId,
    ) -> Result<ApplyOutcome, MarketplaceError> {
        caller.require(Role::Seeker, "apply for jobs")?;
        let seeker = self.seeker(&caller.user_id)?;

        let outcome = retry_on_conflict(self.config.commit_attempts, "apply_for_job", || {
            let mut job = self.job(job_id)?;
            if !job.is_open() {
                return Err(MarketplaceError::invalid_state(format!(
                    "job '{}' is {} and no longer accepts applications",
                    job.id, job.status
                )));
            }
            if let Some(existing) = self.store.application_for(&job.id, &seeker.id)? {
                return Ok((ApplyOutcome::Duplicate(existing), job));
            }

            let application = Application {
                id: next_application_id(),
                job_id: job.id.clone(),
                seeker_id: seeker.id.clone(),
                seeker_name: seeker.name.clone(),
                status: ApplicationStatus::Pending,
                applied_at: Utc::now(),
                seeker_profile: SeekerSnapshot {
                    skills: seeker.skills.clone(),
                    rating: seeker.rating,
                    experience: seeker.bio.clone(),
                },
                feedback: None,
                version: 0,
            };
            job.applicant_count += 1;

            let committed = self.store.commit(
                ChangeSet::new()
                    .insert_application(application.clone())
                    .update_job(job.clone()),
            )?;
            let job = committed.job(&job.id).cloned().unwrap_or(job);
            let application = committed
                .application(&application.id)
                .cloned()
                .unwrap_or(application);
            Ok((ApplyOutcome::Created(application), job))
        });

        let (outcome, job) = outcome?;
        match &outcome {
            ApplyOutcome::Created(application) => {
                info!(
                    job_id = %job.id,
                    application_id = %application.id,
                    seeker_id = %application.seeker_id,
                    applicants = job.applicant_count,
                    "application filed"
                );
                emit_best_effort(
                    self.events.as_ref(),
                    MarketplaceEvent::ApplicationSubmitted {
                        job,
                        application: application.clone(),
                    },
                );
            }
            ApplyOutcome::Duplicate(application) => {
                info!(
                    job_id = %job.id,
                    application_id = %application.id,
                    "seeker already applied; returning existing application"
                );
            }
        }
        Ok(outcome)
    }

    /// Select one applicant. In the same commit every sibling application is rejected and the
    /// job moves to `assigned`.
    pub fn select_applicant(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<Selection, MarketplaceError> {
        caller.require(Role::Provider, "select applicants")?;

        let selection = retry_on_conflict(self.config.commit_attempts, "select_applicant", || {
            let chosen = self
                .store
                .application(application_id)?
                .ok_or_else(|| MarketplaceError::not_found("application", application_id))?;
            let mut job = self.job(&chosen.job_id)?;

            if job.provider_id != caller.user_id {
                return Err(MarketplaceError::permission_denied(
                    "only the job's provider can select applicants",
                ));
            }
            if !job.status.can_advance_to(JobStatus::Assigned) {
                return Err(MarketplaceError::invalid_state(format!(
                    "job '{}' is {}; applicants can only be selected while it is open",
                    job.id, job.status
                )));
            }
            if chosen.status.is_terminal() {
                return Err(MarketplaceError::invalid_state(format!(
                    "application '{}' is already {}",
                    chosen.id, chosen.status
                )));
            }

            let mut changes = ChangeSet::new();
            let mut rejected_ids = Vec::new();
            let mut chosen_listed = false;
            for mut sibling in self.store.applications_for_job(&job.id)? {
                if sibling.id == chosen.id {
                    sibling.status = ApplicationStatus::Selected;
                    chosen_listed = true;
                } else {
                    match sibling.status {
                        ApplicationStatus::Pending => {
                            sibling.status = ApplicationStatus::Rejected;
                            rejected_ids.push(sibling.id.clone());
                        }
                        ApplicationStatus::Rejected => continue,
                        ApplicationStatus::Selected => {
                            return Err(MarketplaceError::invalid_state(format!(
                                "job '{}' already has a selected application",
                                job.id
                            )));
                        }
                    }
                }
                changes = changes.update_application(sibling);
            }
            if !chosen_listed {
                return Err(MarketplaceError::invalid_state(format!(
                    "application '{}' is not listed under job '{}'",
                    chosen.id, job.id
                )));
            }

            job.status = JobStatus::Assigned;
            job.assigned_seeker_id = Some(chosen.seeker_id.clone());
            changes = changes.update_job(job.clone());

            let committed = self.store.commit(changes)?;
            let application = committed
                .application(&chosen.id)
                .cloned()
                .ok_or_else(|| MarketplaceError::not_found("application", &chosen.id))?;
            let rejected = rejected_ids
                .iter()
                .filter_map(|id| committed.application(id).cloned())
                .collect();
            let job = committed.job(&job.id).cloned().unwrap_or(job);

            Ok(Selection {
                application,
                job,
                rejected,
            })
        })?;

        info!(
            job_id = %selection.job.id,
            application_id = %selection.application.id,
            seeker_id = %selection.application.seeker_id,
            rejected = selection.rejected.len(),
            "applicant selected"
        );

        emit_best_effort(
            self.events.as_ref(),
            MarketplaceEvent::ApplicantSelected {
                job: selection.job.clone(),
                application: selection.application.clone(),
                rejected: selection.rejected.clone(),
            },
        );
        Ok(selection)
    }

    /// Providers see every application on their own job; seekers see only their own.
    pub fn applications_for_job(
        &self,
        caller: &Caller,
        job_id: &JobId,
    ) -> Result<Vec<Application>, MarketplaceError> {
        let job = self.job(job_id)?;
        let applications = self.store.applications_for_job(&job.id)?;

        match caller.role {
            Role::Provider if job.provider_id == caller.user_id => Ok(applications),
            Role::Provider => Err(MarketplaceError::permission_denied(
                "only the job's provider can view its applications",
            )),
            Role::Seeker => Ok(applications
                .into_iter()
                .filter(|application| application.seeker_id == caller.user_id)
                .collect()),
        }
    }

    pub fn applications_for_seeker(
        &self,
        caller: &Caller,
        seeker_id: &UserId,
    ) -> Result<Vec<Application>, MarketplaceError> {
        caller.require(Role::Seeker, "list applications")?;
        if &caller.user_id != seeker_id {
            return Err(MarketplaceError::permission_denied(
                "seekers can only list their own applications",
            ));
        }
        Ok(self.store.applications_for_seeker(seeker_id)?)
    }

    /// The caller's application for `job_id`, looked up by the (job, seeker) pair.
    pub fn my_application(
        &self,
        caller: &Caller,
        job_id: &JobId,
    ) -> Result<Option<Application>, MarketplaceError> {
        caller.require(Role::Seeker, "view their application")?;
        Ok(self.store.application_for(job_id, &caller.user_id)?)
    }

    fn job(&self, id: &JobId) -> Result<Job, MarketplaceError> {
        self.store
            .job(id)?
            .ok_or_else(|| MarketplaceError::not_found("job", id))
    }

    fn seeker(&self, id: &UserId) -> Result<User, MarketplaceError> {
        let user = self
            .store
            .user(id)?
            .ok_or_else(|| MarketplaceError::not_found("user", id))?;
        if user.role != Role::Seeker {
            return Err(MarketplaceError::permission_denied(format!(
                "user '{}' is registered as a {}",
                user.id, user.role
            )));
        }
        Ok(user)
    }
}
