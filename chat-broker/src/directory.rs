//! User identity records, kept apart from message routing.
//!
//! The directory shares the id namespace with the broker's registry by
//! convention only. Neither one ever locks the other.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{DirectoryError, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    /// Builds a user and validates it.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user = Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        };
        user.validate()?;
        Ok(user)
    }

    /// Name and id must be non-empty; email must contain `@` and `.`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !self.email.contains('@') || !self.email.contains('.') {
            return Err(ValidationError::InvalidEmail);
        }
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(())
    }
}

/// Concurrent map of user id to [`User`].
///
/// Records are stored as given; call [`User::validate`] (or build them with
/// [`User::new`]) before adding.
pub struct Directory {
    cancel: CancellationToken,
    users: RwLock<HashMap<String, User>>,
}

impl Directory {
    /// A directory that is never cancelled.
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// A directory whose `add_user` fails once `cancel` fires.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Stores `user`, replacing any record with the same id.
    pub async fn add_user(&self, user: User) -> Result<(), DirectoryError> {
        if self.cancel.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Removes `id`, returning the record that was stored.
    ///
    /// The existence check and the delete share one write guard, so two
    /// concurrent removals of the same id can't both succeed.
    pub async fn remove_user(&self, id: &str) -> Result<User, DirectoryError> {
        let mut users = self.users.write().await;
        users
            .remove(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    pub async fn get_user(&self, id: &str) -> Result<User, DirectoryError> {
        let users = self.users.read().await;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    /// All records, ordered by id.
    pub async fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
