//! Token issuance and verification. The booking core only needs the
//! stable user identifier and role a verified token yields; everything
//! else about the token is opaque to it.

use std::time::Duration;

use derive_more::Display;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::db::user;

/// Verified caller identity.
#[derive(Clone, Copy, Debug)]
pub struct Identity {
    pub user_id: user::Id,
    pub role: user::Role,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
struct Claims {
    user_id: user::Id,
    role: user::Role,
    exp: i64,
}

#[derive(Debug, Display)]
#[display("identity is not verified")]
pub struct Unauthorized;

pub struct Verifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    expiration_time: Duration,
}

impl Verifier {
    pub fn new(secret: &str, expiration_time: Duration) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            expiration_time,
        }
    }

    pub fn issue(
        &self,
        user_id: user::Id,
        role: user::Role,
    ) -> Result<String, Unauthorized> {
        let expires_at = OffsetDateTime::now_utc() + self.expiration_time;
        encode(
            &Header::default(),
            &Claims {
                user_id,
                role,
                exp: expires_at.unix_timestamp(),
            },
            &self.encoding_key,
        )
        .map_err(|_| Unauthorized)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, Unauthorized> {
        let token_data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::default(),
        )
        .map_err(|_| Unauthorized)?;

        Ok(Identity {
            user_id: token_data.claims.user_id,
            role: token_data.claims.role,
        })
    }
}
