use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MarketplaceError;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier for a registered provider or seeker.
    UserId
);
identifier!(
    /// Identifier for a posted job.
    JobId
);
identifier!(
    /// Identifier for a seeker's application to a job.
    ApplicationId
);
identifier!(NotificationId);

/// Marketplace role fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Seeker,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Provider => "provider",
            Role::Seeker => "seeker",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "provider" => Some(Role::Provider),
            "seeker" => Some(Role::Seeker),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated identity supplied with every request. The core trusts it as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn provider(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Provider)
    }

    pub fn seeker(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Seeker)
    }

    /// Capability guard run once at the entry point of every role-restricted operation.
    pub fn require(&self, role: Role, action: &str) -> Result<(), MarketplaceError> {
        if self.role == role {
            Ok(())
        } else {
            Err(MarketplaceError::PermissionDenied(format!(
                "only {}s can {action}",
                role.label()
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub name: String,
    pub location: String,
    pub bio: String,
    pub skills: BTreeSet<String>,
    /// Average feedback score in `[0, 5]`; zero until the first rated job.
    pub rating: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// Registration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub role: Role,
    pub location: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial profile edit. Role is deliberately absent: it never changes after registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    /// `Some("")` clears the stored address.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Open,
    Assigned,
    Completed,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Assigned => "assigned",
            JobStatus::Completed => "completed",
        }
    }

    /// Jobs only move forward, one step at a time.
    pub const fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Open, JobStatus::Assigned) | (JobStatus::Assigned, JobStatus::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub provider_id: UserId,
    pub provider_name: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    /// Lower-cased and trimmed on the way in.
    pub required_skills: BTreeSet<String>,
    pub payment: String,
    pub duration: String,
    pub status: JobStatus,
    pub applicant_count: u32,
    pub assigned_seeker_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl Job {
    pub fn is_open(&self) -> bool {
        self.status == JobStatus::Open
    }

    /// True when `user` may close the job out: the owner or the assigned seeker.
    pub fn is_party(&self, user: &UserId) -> bool {
        &self.provider_id == user || self.assigned_seeker_id.as_ref() == Some(user)
    }
}

/// Provider-supplied description of a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub payment: String,
    pub duration: String,
}

/// Optional equality filters for job listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Selected,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Selected => "selected",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Seeker details captured when the application is filed, shown to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekerSnapshot {
    pub skills: BTreeSet<String>,
    pub rating: f32,
    pub experience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    pub comment: String,
    pub given_by: UserId,
    pub author_role: Role,
    pub given_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub seeker_id: UserId,
    pub seeker_name: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub seeker_profile: SeekerSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub version: u64,
}

/// Closing rating and comment submitted with `complete_job`, which rejects ratings outside 1..=5
/// as a validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub rating: i64,
    pub feedback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NewApplication,
    JobSelected,
    NewMatchingJob,
    JobFeedback,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::NewApplication => "new-application",
            NotificationKind::JobSelected => "job-selected",
            NotificationKind::NewMatchingJob => "new-matching-job",
            NotificationKind::JobFeedback => "job-feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}
