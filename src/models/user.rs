pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
}

pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
}
