use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{Caller, NewUser, ProfileUpdate, Role, User, UserId};
use super::error::{required, MarketplaceError};
use super::matching::normalize_skills;
use super::store::{retry_on_conflict, ChangeSet, MarketplaceStore};
use crate::config::MarketplaceConfig;

static USER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_user_id() -> UserId {
    let id = USER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UserId(format!("usr-{id:06}"))
}

/// Registration and profile maintenance for providers and seekers.
pub struct UserService<S> {
    store: Arc<S>,
    config: MarketplaceConfig,
}

impl<S> UserService<S>
where
    S: MarketplaceStore + 'static,
{
    pub fn new(store: Arc<S>, config: MarketplaceConfig) -> Self {
        Self { store, config }
    }

    pub fn register(&self, new_user: NewUser) -> Result<User, MarketplaceError> {
        let skills = skills_for_role(new_user.role, &new_user.skills)?;
        let user = User {
            id: next_user_id(),
            role: new_user.role,
            name: required("name", &new_user.name)?,
            location: required("location", &new_user.location)?,
            bio: new_user.bio.trim().to_string(),
            skills,
            rating: 0.0,
            email: contact(new_user.email),
            phone: contact(new_user.phone),
            created_at: Utc::now(),
            version: 0,
        };

        let committed = self.store.commit(ChangeSet::new().insert_user(user.clone()))?;
        let stored = committed.user(&user.id).cloned().unwrap_or(user);
        info!(user_id = %stored.id, role = %stored.role, "user registered");
        Ok(stored)
    }

    pub fn user(&self, id: &UserId) -> Result<User, MarketplaceError> {
        self.store
            .user(id)?
            .ok_or_else(|| MarketplaceError::not_found("user", id))
    }

    pub fn current(&self, caller: &Caller) -> Result<User, MarketplaceError> {
        self.user(&caller.user_id)
    }

    /// Edit the caller's own profile. Role is fixed at registration and cannot be edited here.
    pub fn update_profile(
        &self,
        caller: &Caller,
        update: ProfileUpdate,
    ) -> Result<User, MarketplaceError> {
        retry_on_conflict(self.config.commit_attempts, "update_profile", || {
            let mut user = self.user(&caller.user_id)?;

            if let Some(name) = &update.name {
                user.name = required("name", name)?;
            }
            if let Some(location) = &update.location {
                user.location = required("location", location)?;
            }
            if let Some(bio) = &update.bio {
                user.bio = bio.trim().to_string();
            }
            if let Some(skills) = &update.skills {
                user.skills = skills_for_role(user.role, skills)?;
            }
            if let Some(email) = &update.email {
                user.email = contact(Some(email.clone()));
            }
            if let Some(phone) = &update.phone {
                user.phone = contact(Some(phone.clone()));
            }

            let id = user.id.clone();
            let committed = self.store.commit(ChangeSet::new().update_user(user))?;
            committed
                .user(&id)
                .cloned()
                .ok_or_else(|| MarketplaceError::not_found("user", &id))
        })
    }
}

fn contact(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn skills_for_role(role: Role, raw: &[String]) -> Result<BTreeSet<String>, MarketplaceError> {
    let skills = normalize_skills(raw);
    if role == Role::Provider && !skills.is_empty() {
        return Err(MarketplaceError::validation(
            "skills can only be declared by seekers",
        ));
    }
    Ok(skills)
}
