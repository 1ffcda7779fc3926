use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{NewUser, User, UserId};

#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn get(&self, id: UserId) -> anyhow::Result<Option<User>>;
    async fn insert(&self, user: NewUser) -> anyhow::Result<User>;
}

pub struct InMemoryUserStorage {
    store: RwLock<(UserId, HashMap<UserId, User>)>,
}

impl InMemoryUserStorage {
    pub fn new() -> Self {
        InMemoryUserStorage {
            store: RwLock::new((1, HashMap::new())),
        }
    }
}

impl Default for InMemoryUserStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn get(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let store = self.store.read().await;
        Ok(store.1.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> anyhow::Result<User> {
        let mut store = self.store.write().await;
        let id = store.0;
        let created = User {
            id,
            username: user.username,
            email: user.email,
        };

        store.1.insert(id, created.clone());
        store.0 += 1;

        Ok(created)
    }
}
