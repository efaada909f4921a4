use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
#[cfg(test)]
use tokio::sync::RwLockWriteGuard;

use crate::message::Message;

/// Sending half of a recipient's bounded receive channel.
pub type Inbox = mpsc::Sender<Message>;

/// Map of user id to inbox, guarded by a single reader/writer lock.
///
/// Guards never escape this type, so callers can't hold the lock across a
/// channel send. Lookups hand back cloned senders instead.
#[derive(Default)]
pub struct Registry {
    inboxes: RwLock<HashMap<String, Inbox>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `inbox` for `id`, returning the inbox it replaced.
    ///
    /// A replaced inbox is left open; its receiver belongs to whoever
    /// registered it first.
    pub async fn register(&self, id: String, inbox: Inbox) -> Option<Inbox> {
        let mut inboxes = self.inboxes.write().await;
        inboxes.insert(id, inbox)
    }

    /// Removes `id`. Returns whether a mapping existed.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut inboxes = self.inboxes.write().await;
        inboxes.remove(id).is_some()
    }

    pub async fn lookup(&self, id: &str) -> Option<Inbox> {
        let inboxes = self.inboxes.read().await;
        inboxes.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inboxes.read().await.contains_key(id)
    }

    /// Copies every current registration for a broadcast fan-out.
    pub async fn snapshot(&self) -> Vec<(String, Inbox)> {
        let inboxes = self.inboxes.read().await;
        inboxes
            .iter()
            .map(|(id, inbox)| (id.clone(), inbox.clone()))
            .collect()
    }

    /// Registered ids in sorted order.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inboxes.read().await.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inboxes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Takes the write guard so tests can park readers mid-dispatch.
    #[cfg(test)]
    pub(crate) async fn hold_exclusive(&self) -> RwLockWriteGuard<'_, HashMap<String, Inbox>> {
        self.inboxes.write().await
    }
}
