//! Entity store contract for users, jobs and applications.
//!
//! Reads are plain lookups. Every write goes through [`MarketplaceStore::commit`], which applies a
//! [`ChangeSet`] all-or-nothing. Updated records carry the `version` they were read at; the store
//! rejects the whole change set with [`StoreError::Stale`] if any of them moved in the meantime, so
//! callers re-read and re-validate instead of overwriting a concurrent transition.

mod changeset;
mod memory;

pub use changeset::{ChangeSet, Committed, Write};
pub use memory::InMemoryStore;

use tracing::debug;

use super::domain::{Application, ApplicationId, Job, JobId, Role, User, UserId};
use super::error::MarketplaceError;

pub trait MarketplaceStore: Send + Sync {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;
    /// All jobs, oldest first.
    fn jobs(&self) -> Result<Vec<Job>, StoreError>;
    fn jobs_by_provider(&self, provider: &UserId) -> Result<Vec<Job>, StoreError>;

    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    fn applications_for_job(&self, job: &JobId) -> Result<Vec<Application>, StoreError>;
    fn applications_for_seeker(&self, seeker: &UserId) -> Result<Vec<Application>, StoreError>;
    fn application_for(
        &self,
        job: &JobId,
        seeker: &UserId,
    ) -> Result<Option<Application>, StoreError>;

    /// Apply every write in `changes` or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} '{id}' changed since it was read")]
    Stale { entity: &'static str, id: String },
    #[error("{entity} '{id}' not found")]
    Missing { entity: &'static str, id: String },
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Lost a race with another writer; re-reading may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Stale { .. } | StoreError::Conflict(_))
    }
}

/// Runs a read-validate-commit closure, re-running it when the commit loses a race.
///
/// Each retry re-reads current state, so the closure's own guards (job still open, no existing
/// application, ...) are evaluated against whatever the winning writer left behind.
pub(crate) fn retry_on_conflict<T>(
    attempts: u8,
    operation: &'static str,
    mut attempt: impl FnMut() -> Result<T, MarketplaceError>,
) -> Result<T, MarketplaceError> {
    let attempts = attempts.max(1);
    let mut tries = 0u8;
    loop {
        tries += 1;
        match attempt() {
            Err(MarketplaceError::Store(err)) if err.is_retryable() && tries < attempts => {
                debug!(operation, attempt = tries, error = %err, "commit lost a race, re-validating");
            }
            other => return other,
        }
    }
}
