// In-memory user store

use crate::errors::StoreError;
use crate::models::{User, UserId};
use crate::store::{UserMutation, UserStore, UserVisitor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// User store kept in process memory, optionally seeded from a JSON file
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given users
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|user| (user.id, user)).collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Load users from a JSON array file. Legacy saved-search records are migrated on decode.
    #[instrument]
    pub async fn from_seed_file(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::FileSystem(format!("{}: {}", path.display(), e)))?;
        let users: Vec<User> = serde_json::from_str(&raw)?;

        if let Some(user) = users.iter().find(|user| user.id == 0) {
            return Err(StoreError::InvalidRecord(format!(
                "seed user '{}' has id 0",
                user.name
            )));
        }

        info!(users = users.len(), path = %path.display(), "Seeded memory user store");
        Ok(Self::with_users(users))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::UserNotFound(id))
    }

    async fn put_user(&self, user: User) -> Result<(), StoreError> {
        if user.id == 0 {
            return Err(StoreError::InvalidUserId);
        }

        self.users.write().await.insert(user.id, user);
        Ok(())
    }

    async fn update_user(&self, id: UserId, mutation: UserMutation) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let current = users.get(&id).ok_or(StoreError::UserNotFound(id))?;

        let mut updated = current.clone();
        mutation(&mut updated)?;
        users.insert(id, updated);

        debug!(user_id = id, "User updated");
        Ok(())
    }

    async fn for_each_user(&self, visitor: &mut UserVisitor<'_>) -> Result<(), StoreError> {
        let snapshot: Vec<User> = self.users.read().await.values().cloned().collect();

        for user in snapshot {
            visitor(user)?;
        }
        Ok(())
    }

    async fn ensure_user(&self, id: UserId, name: &str, chat_id: i64) -> Result<User, StoreError> {
        if id == 0 {
            return Err(StoreError::InvalidUserId);
        }

        let mut users = self.users.write().await;
        let user = users
            .entry(id)
            .or_insert_with(|| User::new(id, name, chat_id));
        Ok(user.clone())
    }
}
