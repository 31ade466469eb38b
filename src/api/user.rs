use serde::{Deserialize, Serialize};

pub use crate::db::user::{Id, PasswordHash, Role};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub role: Role,
}

/// Session bootstrap payload. `user` is `null` when no valid token
/// accompanies the request; the endpoint itself never rejects.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    pub user: Option<User>,
}
