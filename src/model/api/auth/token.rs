use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    db::user::User,
    mongodb::{Coll, Id},
};

use super::user::{Caller, Rights, Role};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<R> {
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(rename = "rt")]
    pub rt_id: Id,
    #[serde(skip)]
    phantom: PhantomData<R>,
}

impl<R> AuthToken<R> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }

    /// The identity this token stands for.
    pub fn caller(&self) -> Caller {
        Caller {
            id: self.id,
            rights: self.rights,
            rt_id: self.rt_id,
        }
    }
}

impl<R> AuthToken<R>
where
    R: Role,
{
    /// Create a new [`AuthToken`] for the given user.
    /// Returns `None` if the user does not hold the rights of this role.
    pub fn for_user(user: &User) -> Option<Self> {
        (user.rights == R::RIGHTS).then(|| Self {
            id: user.id,
            rights: R::RIGHTS,
            rt_id: user.rt_id,
            phantom: PhantomData,
        })
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>, Error> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<R>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<R> {
    #[serde(flatten, bound = "")]
    token: AuthToken<R>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, R> FromRequest<'r> for AuthToken<R>
where
    R: Role + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and verify that it has the correct rights for this
    /// role, and that the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(req
            .guard::<&State<Config>>()
            .await
            .map_failure(|(status, _)| (status, Error::NotFound("config".to_string()))));

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));

        // Decode the token.
        let token: Self = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        // Check it represents the correct rights.
        if !token.permits(R::RIGHTS) {
            return Outcome::Forward(());
        }

        // Check the user actually exists.
        let users = try_outcome!(req
            .guard::<Coll<User>>()
            .await
            .map_failure(|(status, _)| (status, Error::NotFound("database".to_string()))));
        match users.find_one(token.id.as_doc(), None).await {
            Ok(Some(user)) if user.rights == token.rights => Outcome::Success(token),
            Ok(_) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::model::{api::auth::user::Voter, db::user::UserCore};

    fn config() -> Config {
        Config::example()
    }

    fn voter() -> User {
        User {
            id: Id::new(),
            user: UserCore::example_voter(),
        }
    }

    #[test]
    fn cookie_roundtrip_keeps_identity() {
        let user = voter();
        let token = AuthToken::<Voter>::for_user(&user).unwrap();
        let cookie = token.into_cookie(&config()).unwrap();
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let decoded = AuthToken::<Voter>::from_cookie(&cookie, &config()).unwrap();
        assert_eq!(
            decoded.caller(),
            Caller {
                id: user.id,
                rights: Rights::Voter,
                rt_id: user.rt_id,
            }
        );
    }

    #[test]
    fn wrong_role_gets_no_token() {
        assert!(AuthToken::<crate::model::api::auth::user::Admin>::for_user(&voter()).is_none());
    }

    #[test]
    fn expired_or_foreign_cookies_are_rejected() {
        let claims = Claims {
            token: AuthToken::<Voter>::for_user(&voter()).unwrap(),
            expire_at: Utc::now() - ChronoDuration::hours(1),
        };
        let stale = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config().jwt_secret()),
        )
        .unwrap();
        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, stale);
        assert!(AuthToken::<Voter>::from_cookie(&cookie, &config()).is_err());

        let forged = Cookie::new(AUTH_TOKEN_COOKIE, "not.a.jwt");
        assert!(AuthToken::<Voter>::from_cookie(&forged, &config()).is_err());
    }
}
