use std::error::Error as StdError;

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};

use super::Client;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: PasswordHash,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin = 1,
    User = 2,
    EventManager = 3,
    Other = 4,
}

impl FromSql<'_> for Role {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let role = Self::try_from(repr).map_err(|_| "invalid role")?;
        Ok(role)
    }
}

impl ToSql for Role {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str) -> Self {
        // TODO: Use real hash function.
        Self(secret.to_string())
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

impl Client {
    /// Email lookup is case-insensitive: `Alice@Example.com` and
    /// `alice@example.com` name the same account.
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role \
                           FROM users \
                           WHERE LOWER(email) = LOWER($1) \
                           LIMIT 1";
        Ok(self.0.query_opt(SQL, &[&email]).await?.map(|row| User {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
        }))
    }

    pub async fn get_user_by_id(&self, id: Id) -> Result<Option<User>, Error> {
        const SQL: &str = "SELECT id, name, email, password_hash, role \
                           FROM users \
                           WHERE id = $1 \
                           LIMIT 1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.map(|row| User {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
        }))
    }
}
