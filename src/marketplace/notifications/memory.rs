use std::sync::{Arc, RwLock};

use super::NotificationRepository;
use crate::marketplace::domain::{Notification, NotificationId, UserId};
use crate::marketplace::store::StoreError;

#[derive(Debug, Default, Clone)]
pub struct InMemoryNotifications {
    entries: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("notification lock poisoned".to_string())
}

impl NotificationRepository for InMemoryNotifications {
    fn insert(&self, notification: Notification) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.iter().any(|entry| entry.id == notification.id) {
            return Err(StoreError::Conflict(format!(
                "notification '{}' already exists",
                notification.id
            )));
        }
        entries.push(notification);
        Ok(())
    }

    fn get(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.iter().find(|entry| &entry.id == id).cloned())
    }

    fn for_recipient(&self, recipient: &UserId) -> Result<Vec<Notification>, StoreError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        // Insertion order breaks timestamp ties, so walk newest-inserted first and sort stably.
        let mut feed: Vec<Notification> = entries
            .iter()
            .rev()
            .filter(|entry| &entry.recipient == recipient)
            .cloned()
            .collect();
        feed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(feed)
    }

    fn mark_read(&self, id: &NotificationId) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let entry = entries
            .iter_mut()
            .find(|entry| &entry.id == id)
            .ok_or_else(|| StoreError::Missing {
                entity: "notification",
                id: id.to_string(),
            })?;
        let flipped = !entry.read;
        entry.read = true;
        Ok(flipped)
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let mut flipped = 0;
        for entry in entries
            .iter_mut()
            .filter(|entry| &entry.recipient == recipient && !entry.read)
        {
            entry.read = true;
            flipped += 1;
        }
        Ok(flipped)
    }
}
