mod model;

use async_trait::async_trait;
use model::UserStorageModel;

use crate::{
    models::{NewUser, User, UserId},
    storage::UserStorage,
};

pub struct SqliteUserStorage {
    pool: sqlx::SqlitePool,
}

impl SqliteUserStorage {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStorage for SqliteUserStorage {
    async fn get(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, UserStorageModel>("SELECT * FROM users WHERE id = ?;")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user.map(Into::into))
    }

    async fn insert(&self, new_user: NewUser) -> anyhow::Result<User> {
        let NewUser { username, email } = new_user;
        let user = sqlx::query_as::<_, UserStorageModel>(
            "INSERT INTO users (username, email)
                 VALUES (?, ?)
                 RETURNING *",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user.into())
    }
}
