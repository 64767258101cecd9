use crate::marketplace::domain::{Application, ApplicationId, Job, JobId, User, UserId};

/// A single record write inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertUser(User),
    UpdateUser(User),
    InsertJob(Job),
    UpdateJob(Job),
    InsertApplication(Application),
    UpdateApplication(Application),
}

impl Write {
    pub fn entity(&self) -> &'static str {
        match self {
            Write::InsertUser(_) | Write::UpdateUser(_) => "user",
            Write::InsertJob(_) | Write::UpdateJob(_) => "job",
            Write::InsertApplication(_) | Write::UpdateApplication(_) => "application",
        }
    }
}

/// Ordered group of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    writes: Vec<Write>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(mut self, user: User) -> Self {
        self.writes.push(Write::InsertUser(user));
        self
    }

    pub fn update_user(mut self, user: User) -> Self {
        self.writes.push(Write::UpdateUser(user));
        self
    }

    pub fn insert_job(mut self, job: Job) -> Self {
        self.writes.push(Write::InsertJob(job));
        self
    }

    pub fn update_job(mut self, job: Job) -> Self {
        self.writes.push(Write::UpdateJob(job));
        self
    }

    pub fn insert_application(mut self, application: Application) -> Self {
        self.writes.push(Write::InsertApplication(application));
        self
    }

    pub fn update_application(mut self, application: Application) -> Self {
        self.writes.push(Write::UpdateApplication(application));
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Job ids whose cached views a successful commit invalidates.
    pub fn touched_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .writes
            .iter()
            .filter_map(|write| match write {
                Write::InsertJob(job) | Write::UpdateJob(job) => Some(job.id.clone()),
                Write::InsertApplication(application) | Write::UpdateApplication(application) => {
                    Some(application.job_id.clone())
                }
                Write::InsertUser(_) | Write::UpdateUser(_) => None,
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Post-commit state of every record in a change set, with versions as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Committed {
    pub users: Vec<User>,
    pub jobs: Vec<Job>,
    pub applications: Vec<Application>,
}

impl Committed {
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|user| &user.id == id)
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    pub fn application(&self, id: &ApplicationId) -> Option<&Application> {
        self.applications
            .iter()
            .find(|application| &application.id == id)
    }
}
