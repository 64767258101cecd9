use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::changeset::{ChangeSet, Committed, Write};
use super::{MarketplaceStore, StoreError};
use crate::marketplace::domain::{Application, ApplicationId, Job, JobId, Role, User, UserId};

/// Process-local store. A single `RwLock` over all tables makes each commit one critical section,
/// so readers never observe half of a cascade.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    jobs: HashMap<JobId, Job>,
    job_order: Vec<JobId>,
    applications: HashMap<ApplicationId, Application>,
    jobs_by_provider: HashMap<UserId, Vec<JobId>>,
    applications_by_job: HashMap<JobId, Vec<ApplicationId>>,
    applications_by_seeker: HashMap<UserId, Vec<ApplicationId>>,
    pairs: HashMap<(JobId, UserId), ApplicationId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl MarketplaceStore for InMemoryStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(id).cloned())
    }

    fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let tables = self.read()?;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.read()?.jobs.get(id).cloned())
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .job_order
            .iter()
            .filter_map(|id| tables.jobs.get(id).cloned())
            .collect())
    }

    fn jobs_by_provider(&self, provider: &UserId) -> Result<Vec<Job>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .jobs_by_provider
            .get(provider)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.jobs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.read()?.applications.get(id).cloned())
    }

    fn applications_for_job(&self, job: &JobId) -> Result<Vec<Application>, StoreError> {
        let tables = self.read()?;
        Ok(tables.collect_applications(tables.applications_by_job.get(job)))
    }

    fn applications_for_seeker(&self, seeker: &UserId) -> Result<Vec<Application>, StoreError> {
        let tables = self.read()?;
        Ok(tables.collect_applications(tables.applications_by_seeker.get(seeker)))
    }

    fn application_for(
        &self,
        job: &JobId,
        seeker: &UserId,
    ) -> Result<Option<Application>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .pairs
            .get(&(job.clone(), seeker.clone()))
            .and_then(|id| tables.applications.get(id).cloned()))
    }

    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut tables = self.write()?;
        tables.validate(changes.writes())?;
        Ok(tables.apply(changes.into_writes()))
    }
}

impl Tables {
    fn collect_applications(&self, ids: Option<&Vec<ApplicationId>>) -> Vec<Application> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.applications.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }

    /// Checks every write against current state before anything is mutated.
    fn validate(&self, writes: &[Write]) -> Result<(), StoreError> {
        let mut new_users: HashSet<&UserId> = HashSet::new();
        let mut new_jobs: HashSet<&JobId> = HashSet::new();
        let mut new_applications: HashSet<&ApplicationId> = HashSet::new();
        let mut new_pairs: HashSet<(&JobId, &UserId)> = HashSet::new();
        let mut updated: HashSet<(&'static str, String)> = HashSet::new();

        for write in writes {
            match write {
                Write::InsertUser(user) => {
                    if self.users.contains_key(&user.id) || !new_users.insert(&user.id) {
                        return Err(StoreError::Conflict(format!(
                            "user '{}' already exists",
                            user.id
                        )));
                    }
                }
                Write::UpdateUser(user) => {
                    let current = self
                        .users
                        .get(&user.id)
                        .ok_or_else(|| missing("user", &user.id))?;
                    check_version("user", &user.id, current.version, user.version)?;
                    if current.role != user.role {
                        return Err(StoreError::Conflict(format!(
                            "role of user '{}' is immutable",
                            user.id
                        )));
                    }
                    once_per_commit(&mut updated, write.entity(), &user.id)?;
                }
                Write::InsertJob(job) => {
                    if self.jobs.contains_key(&job.id) || !new_jobs.insert(&job.id) {
                        return Err(StoreError::Conflict(format!(
                            "job '{}' already exists",
                            job.id
                        )));
                    }
                    if !self.users.contains_key(&job.provider_id)
                        && !new_users.contains(&job.provider_id)
                    {
                        return Err(missing("user", &job.provider_id));
                    }
                }
                Write::UpdateJob(job) => {
                    let current = self
                        .jobs
                        .get(&job.id)
                        .ok_or_else(|| missing("job", &job.id))?;
                    check_version("job", &job.id, current.version, job.version)?;
                    if current.provider_id != job.provider_id {
                        return Err(StoreError::Conflict(format!(
                            "owner of job '{}' is immutable",
                            job.id
                        )));
                    }
                    once_per_commit(&mut updated, write.entity(), &job.id)?;
                }
                Write::InsertApplication(application) => {
                    if self.applications.contains_key(&application.id)
                        || !new_applications.insert(&application.id)
                    {
                        return Err(StoreError::Conflict(format!(
                            "application '{}' already exists",
                            application.id
                        )));
                    }
                    if !self.jobs.contains_key(&application.job_id)
                        && !new_jobs.contains(&application.job_id)
                    {
                        return Err(missing("job", &application.job_id));
                    }
                    let pair_taken = self
                        .pairs
                        .contains_key(&(application.job_id.clone(), application.seeker_id.clone()))
                        || !new_pairs.insert((&application.job_id, &application.seeker_id));
                    if pair_taken {
                        return Err(StoreError::Conflict(format!(
                            "seeker '{}' already applied to job '{}'",
                            application.seeker_id, application.job_id
                        )));
                    }
                }
                Write::UpdateApplication(application) => {
                    let current = self
                        .applications
                        .get(&application.id)
                        .ok_or_else(|| missing("application", &application.id))?;
                    check_version(
                        "application",
                        &application.id,
                        current.version,
                        application.version,
                    )?;
                    if current.job_id != application.job_id
                        || current.seeker_id != application.seeker_id
                    {
                        return Err(StoreError::Conflict(format!(
                            "application '{}' cannot move between jobs or seekers",
                            application.id
                        )));
                    }
                    once_per_commit(&mut updated, write.entity(), &application.id)?;
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, writes: Vec<Write>) -> Committed {
        let mut committed = Committed::default();

        for write in writes {
            match write {
                Write::InsertUser(mut user) => {
                    user.version = 1;
                    self.users.insert(user.id.clone(), user.clone());
                    committed.users.push(user);
                }
                Write::UpdateUser(mut user) => {
                    user.version += 1;
                    self.users.insert(user.id.clone(), user.clone());
                    committed.users.push(user);
                }
                Write::InsertJob(mut job) => {
                    job.version = 1;
                    self.job_order.push(job.id.clone());
                    self.jobs_by_provider
                        .entry(job.provider_id.clone())
                        .or_default()
                        .push(job.id.clone());
                    self.jobs.insert(job.id.clone(), job.clone());
                    committed.jobs.push(job);
                }
                Write::UpdateJob(mut job) => {
                    job.version += 1;
                    self.jobs.insert(job.id.clone(), job.clone());
                    committed.jobs.push(job);
                }
                Write::InsertApplication(mut application) => {
                    application.version = 1;
                    self.applications_by_job
                        .entry(application.job_id.clone())
                        .or_default()
                        .push(application.id.clone());
                    self.applications_by_seeker
                        .entry(application.seeker_id.clone())
                        .or_default()
                        .push(application.id.clone());
                    self.pairs.insert(
                        (application.job_id.clone(), application.seeker_id.clone()),
                        application.id.clone(),
                    );
                    self.applications
                        .insert(application.id.clone(), application.clone());
                    committed.applications.push(application);
                }
                Write::UpdateApplication(mut application) => {
                    application.version += 1;
                    self.applications
                        .insert(application.id.clone(), application.clone());
                    committed.applications.push(application);
                }
            }
        }

        committed
    }
}

fn missing(entity: &'static str, id: &impl ToString) -> StoreError {
    StoreError::Missing {
        entity,
        id: id.to_string(),
    }
}

fn check_version(
    entity: &'static str,
    id: &impl ToString,
    stored: u64,
    read: u64,
) -> Result<(), StoreError> {
    if stored == read {
        Ok(())
    } else {
        Err(StoreError::Stale {
            entity,
            id: id.to_string(),
        })
    }
}

fn once_per_commit(
    updated: &mut HashSet<(&'static str, String)>,
    entity: &'static str,
    id: &impl ToString,
) -> Result<(), StoreError> {
    if updated.insert((entity, id.to_string())) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{entity} '{}' updated twice in one commit",
            id.to_string()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{ApplicationStatus, JobStatus, SeekerSnapshot};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn user(id: &str, role: Role) -> User {
        User {
            id: UserId::new(id),
            role,
            name: id.to_string(),
            location: "North Village".to_string(),
            bio: String::new(),
            skills: BTreeSet::new(),
            rating: 0.0,
            email: None,
            phone: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    fn job(id: &str, provider: &str) -> Job {
        Job {
            id: JobId::new(id),
            provider_id: UserId::new(provider),
            provider_name: provider.to_string(),
            title: "Harvest Help Needed".to_string(),
            description: "Wheat harvest".to_string(),
            location: "North Village".to_string(),
            category: "Farming".to_string(),
            required_skills: BTreeSet::from(["farming".to_string()]),
            payment: "50 coins per day".to_string(),
            duration: "3 days".to_string(),
            status: JobStatus::Open,
            applicant_count: 0,
            assigned_seeker_id: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 0,
        }
    }

    fn application(id: &str, job: &str, seeker: &str) -> Application {
        Application {
            id: ApplicationId::new(id),
            job_id: JobId::new(job),
            seeker_id: UserId::new(seeker),
            seeker_name: seeker.to_string(),
            status: ApplicationStatus::Pending,
            applied_at: Utc::now(),
            seeker_profile: SeekerSnapshot {
                skills: BTreeSet::new(),
                rating: 0.0,
                experience: String::new(),
            },
            feedback: None,
            version: 0,
        }
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .commit(
                ChangeSet::new()
                    .insert_user(user("p-1", Role::Provider))
                    .insert_user(user("s-1", Role::Seeker))
                    .insert_job(job("job-1", "p-1")),
            )
            .expect("seed commits");
        store
    }

    #[test]
    fn inserts_start_at_version_one_and_are_indexed() {
        let store = seeded();
        let stored = store.job(&JobId::new("job-1")).unwrap().expect("job stored");
        assert_eq!(stored.version, 1);
        assert_eq!(store.jobs_by_provider(&UserId::new("p-1")).unwrap().len(), 1);
        assert_eq!(store.users_by_role(Role::Seeker).unwrap().len(), 1);
    }

    #[test]
    fn stale_update_rejects_the_whole_change_set() {
        let store = seeded();
        let mut fresh = store.job(&JobId::new("job-1")).unwrap().unwrap();
        let mut stale = fresh.clone();

        fresh.applicant_count = 1;
        store
            .commit(ChangeSet::new().update_job(fresh))
            .expect("first writer wins");

        stale.status = JobStatus::Assigned;
        let err = store
            .commit(
                ChangeSet::new()
                    .insert_application(application("app-1", "job-1", "s-1"))
                    .update_job(stale),
            )
            .expect_err("stale version rejected");
        assert!(matches!(err, StoreError::Stale { entity: "job", .. }));

        let current = store.job(&JobId::new("job-1")).unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Open);
        assert_eq!(current.version, 2);
        assert!(store
            .applications_for_job(&JobId::new("job-1"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn duplicate_job_seeker_pair_is_a_conflict() {
        let store = seeded();
        store
            .commit(ChangeSet::new().insert_application(application("app-1", "job-1", "s-1")))
            .expect("first application stored");

        let err = store
            .commit(ChangeSet::new().insert_application(application("app-2", "job-1", "s-1")))
            .expect_err("pair is unique");
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(err.is_retryable());

        let found = store
            .application_for(&JobId::new("job-1"), &UserId::new("s-1"))
            .unwrap()
            .expect("pair lookup");
        assert_eq!(found.id, ApplicationId::new("app-1"));
    }

    #[test]
    fn role_cannot_change_through_updates() {
        let store = seeded();
        let mut seeker = store.user(&UserId::new("s-1")).unwrap().unwrap();
        seeker.role = Role::Provider;
        let err = store
            .commit(ChangeSet::new().update_user(seeker))
            .expect_err("role is immutable");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn application_requires_an_existing_job() {
        let store = seeded();
        let err = store
            .commit(ChangeSet::new().insert_application(application("app-9", "job-404", "s-1")))
            .expect_err("job must exist");
        assert!(matches!(err, StoreError::Missing { entity: "job", .. }));
    }
}
