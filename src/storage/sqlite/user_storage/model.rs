use crate::models::User;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserStorageModel {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

impl From<UserStorageModel> for User {
    fn from(value: UserStorageModel) -> Self {
        Self {
            id: value.id,
            username: value.username,
            // blank addresses are treated as missing
            email: value.email.filter(|email| !email.trim().is_empty()),
        }
    }
}
