use argon2::Config as Argon2Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{api::auth::Rights, db::user::NewUser, mongodb::Id};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Raw login credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A voter's self-registration into an RT.
#[derive(Clone, Deserialize, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub rt_id: String,
}

impl Credentials {
    /// Convert into a new user by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    pub fn into_user(self, rights: Rights, rt_id: Id) -> Result<NewUser> {
        if self.username.trim().is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }
        if self.password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(self.password.as_bytes(), &salt, &Argon2Config::default())?;
        Ok(NewUser {
            username: self.username,
            password_hash,
            rights,
            rt_id,
        })
    }
}

impl Registration {
    /// Validate the registration and hash the password.
    pub fn into_voter(self) -> Result<NewUser> {
        let rt_id = self
            .rt_id
            .parse::<Id>()
            .map_err(|_| Error::Validation(format!("malformed RT ID {:?}", self.rt_id)))?;
        Credentials {
            username: self.username,
            password: self.password,
        }
        .into_user(Rights::Voter, rt_id)
    }
}
