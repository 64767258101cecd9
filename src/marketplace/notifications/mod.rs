mod emitter;
mod memory;

pub use emitter::NotificationEmitter;
pub use memory::InMemoryNotifications;

use std::sync::Arc;

use super::domain::{Caller, Notification, NotificationId, UserId};
use super::error::MarketplaceError;
use super::store::StoreError;

/// Storage for notification records. Deliberately separate from the entity store: notifications
/// are written after the originating commit and never participate in it.
pub trait NotificationRepository: Send + Sync {
    fn insert(&self, notification: Notification) -> Result<(), StoreError>;
    fn get(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError>;
    /// Newest first.
    fn for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>, StoreError>;
    /// Returns whether the flag flipped.
    fn mark_read(&self, id: &NotificationId) -> Result<bool, StoreError>;
    /// Returns how many flags flipped.
    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, StoreError>;
}

/// Read/acknowledge operations over a user's notification feed.
pub struct NotificationService<N> {
    notifications: Arc<N>,
}

impl<N> NotificationService<N>
where
    N: NotificationRepository + 'static,
{
    pub fn new(notifications: Arc<N>) -> Self {
        Self { notifications }
    }

    pub fn list_for_user(&self, caller: &Caller) -> Result<Vec<Notification>, MarketplaceError> {
        Ok(self.notifications.for_recipient(&caller.user_id)?)
    }

    pub fn unread_count(&self, caller: &Caller) -> Result<usize, MarketplaceError> {
        Ok(self
            .list_for_user(caller)?
            .iter()
            .filter(|notification| !notification.read)
            .count())
    }

    pub fn mark_read(
        &self,
        caller: &Caller,
        id: &NotificationId,
    ) -> Result<Notification, MarketplaceError> {
        let mut notification = self
            .notifications
            .get(id)?
            .ok_or_else(|| MarketplaceError::not_found("notification", id))?;

        if notification.recipient != caller.user_id {
            return Err(MarketplaceError::permission_denied(
                "only the recipient can mark a notification as read",
            ));
        }

        self.notifications.mark_read(id)?;
        notification.read = true;
        Ok(notification)
    }

    pub fn mark_all_read(&self, caller: &Caller) -> Result<usize, MarketplaceError> {
        Ok(self.notifications.mark_all_read(&caller.user_id)?)
    }
}
