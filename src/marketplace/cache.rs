//! Read-through cache over a [`MarketplaceStore`].
//!
//! Only jobs and per-job application lists are cached. Every commit invalidates the entries for the
//! jobs it touched while holding the cache's write lock, so a reader never sees a job whose
//! applications were rewritten underneath it. Fills that raced a commit are discarded via a
//! generation counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use super::domain::{Application, ApplicationId, Job, JobId, Role, User, UserId};
use super::store::{ChangeSet, Committed, MarketplaceStore, StoreError};

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    jobs: HashMap<JobId, Job>,
    applications_by_job: HashMap<JobId, Vec<Application>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub cached_jobs: usize,
    pub cached_application_lists: usize,
}

pub struct CachedStore<S> {
    inner: S,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S> CachedStore<S>
where
    S: MarketplaceStore,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        let (cached_jobs, cached_application_lists) = self
            .read_state()
            .map(|state| (state.jobs.len(), state.applications_by_job.len()))
            .unwrap_or((0, 0));
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cached_jobs,
            cached_application_lists,
        }
    }

    /// Drop everything cached for `job`.
    pub fn invalidate_job(&self, job: &JobId) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        state.jobs.remove(job);
        state.applications_by_job.remove(job);
        state.generation += 1;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        state.jobs.clear();
        state.applications_by_job.clear();
        state.generation += 1;
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("cache lock poisoned".to_string()))
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

impl<S> MarketplaceStore for CachedStore<S>
where
    S: MarketplaceStore,
{
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        self.inner.users_by_role(role)
    }

    fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let generation = {
            let state = self.read_state()?;
            if let Some(job) = state.jobs.get(id) {
                self.hit();
                return Ok(Some(job.clone()));
            }
            state.generation
        };
        self.miss();

        let fetched = self.inner.job(id)?;
        if let Some(job) = &fetched {
            let mut state = self.write_state()?;
            if state.generation == generation {
                state.jobs.insert(job.id.clone(), job.clone());
            }
        }
        Ok(fetched)
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
        let generation = {
            let state = self.read_state()?;
            if let Some(applications) = state.applications_by_job.get(job) {
                self.hit();
                return Ok(applications.clone());
            }
            state.generation
        };
        self.miss();

        let fetched = self.inner.applications_for_job(job)?;
        let mut state = self.write_state()?;
        if state.generation == generation {
            state
                .applications_by_job
                .insert(job.clone(), fetched.clone());
        }
        Ok(fetched)
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
        let touched = changes.touched_jobs();
        let mut state = self.write_state()?;
        let result = self.inner.commit(changes);

        // A rejected commit may still mean our copy is stale, so evict either way.
        for job in &touched {
            state.jobs.remove(job);
            state.applications_by_job.remove(job);
        }
        state.generation += 1;
        if !touched.is_empty() {
            debug!(jobs = touched.len(), "cache entries invalidated");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{ApplicationStatus, JobStatus, SeekerSnapshot};
    use crate::marketplace::store::InMemoryStore;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn user(id: &str, role: Role) -> User {
        User {
            id: UserId::new(id),
            role,
            name: id.to_string(),
            location: "Mwanza".to_string(),
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
            title: "Fence repair".to_string(),
            description: "Mend the goat pen".to_string(),
            location: "Mwanza".to_string(),
            category: "construction".to_string(),
            required_skills: BTreeSet::from(["carpentry".to_string()]),
            payment: "5000 TSh".to_string(),
            duration: "2 days".to_string(),
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

    fn seeded() -> CachedStore<InMemoryStore> {
        let store = CachedStore::new(InMemoryStore::new());
        store
            .commit(
                ChangeSet::new()
                    .insert_user(user("p-1", Role::Provider))
                    .insert_user(user("s-1", Role::Seeker))
                    .insert_job(job("j-1", "p-1")),
            )
            .expect("seed");
        store
    }

    #[test]
    fn repeated_reads_are_served_from_cache() {
        let store = seeded();
        let first = store.job(&JobId::new("j-1")).unwrap().unwrap();
        let second = store.job(&JobId::new("j-1")).unwrap().unwrap();
        assert_eq!(first, second);

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.cached_jobs, 1);
    }

    #[test]
    fn commit_evicts_touched_job_and_its_applications() {
        let store = seeded();
        let job_id = JobId::new("j-1");
        let cached = store.job(&job_id).unwrap().unwrap();
        assert!(store.applications_for_job(&job_id).unwrap().is_empty());

        let mut updated = cached.clone();
        updated.applicant_count = 1;
        store
            .commit(
                ChangeSet::new()
                    .insert_application(application("a-1", "j-1", "s-1"))
                    .update_job(updated),
            )
            .expect("apply");

        assert_eq!(store.stats().cached_jobs, 0);
        let fresh = store.job(&job_id).unwrap().unwrap();
        assert_eq!(fresh.applicant_count, 1);
        assert_eq!(fresh.version, cached.version + 1);
        assert_eq!(store.applications_for_job(&job_id).unwrap().len(), 1);
    }

    #[test]
    fn missing_jobs_are_not_cached() {
        let store = seeded();
        assert!(store.job(&JobId::new("nope")).unwrap().is_none());
        assert_eq!(store.stats().cached_jobs, 0);
    }

    #[test]
    fn explicit_invalidation_forces_a_refetch() {
        let store = seeded();
        let job_id = JobId::new("j-1");
        store.job(&job_id).unwrap();
        store.invalidate_job(&job_id).unwrap();
        store.job(&job_id).unwrap();
        assert_eq!(store.stats().misses, 2);

        store.clear().unwrap();
        assert_eq!(store.stats().cached_jobs, 0);
    }
}
