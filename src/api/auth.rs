use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::auth::{
            Admin, AuthToken, Credentials, Registration, Rights, Role, UserDescription, Voter,
            AUTH_TOKEN_COOKIE,
        },
        db::user::{NewUser, User},
        mongodb::{is_duplicate_key_error, Coll},
    },
    Config,
};

use super::common::inserted_id;

pub fn routes() -> Vec<Route> {
    routes![login, register, voter_profile, admin_profile, logout]
}

/// Issue a token cookie for a user holding the rights of `R`.
fn token_cookie<R: Role>(user: &User, config: &Config) -> Result<Cookie<'static>> {
    AuthToken::<R>::for_user(user)
        .ok_or_else(|| Error::Forbidden(format!("user {} is not a {}", user.username, R::RIGHTS)))?
        .into_cookie(config)
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<Credentials>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let user = users
        .find_one(with_username, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Unauthorized(
                "no user found with the provided username and password combination".to_string(),
            )
        })?;

    let cookie = match user.rights {
        Rights::Voter => token_cookie::<Voter>(&user, config)?,
        Rights::Admin => token_cookie::<Admin>(&user, config)?,
    };
    cookies.add(cookie);
    info!("User {} logged in as {}", user.id, user.rights);

    Ok(Json((&user).into()))
}

#[post("/auth/register", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<Registration>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<Json<UserDescription>> {
    let voter = registration.0.into_voter()?;
    let username_taken = || Error::Validation(format!("username already in use: {}", voter.username));

    // Check username uniqueness. The unique index catches any race past this point.
    let with_username = doc! {
        "username": &voter.username,
    };
    if users.find_one(with_username, None).await?.is_some() {
        return Err(username_taken());
    }

    let id = match new_users.insert_one(&voter, None).await {
        Ok(result) => inserted_id(&result)?,
        Err(e) if is_duplicate_key_error(&e) => return Err(username_taken()),
        Err(e) => return Err(e.into()),
    };
    info!("Registered voter {id} in RT {}", voter.rt_id);

    let user = User { id, user: voter };
    Ok(Json((&user).into()))
}

/// The signed-in user's own account.
async fn profile<R>(token: &AuthToken<R>, users: &Coll<User>) -> Result<Json<UserDescription>> {
    let user = users
        .find_one(token.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", token.id)))?;
    Ok(Json((&user).into()))
}

#[get("/auth/profile")]
pub async fn voter_profile(
    token: AuthToken<Voter>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    profile(&token, &users).await
}

#[get("/auth/profile", rank = 2)]
pub async fn admin_profile(
    token: AuthToken<Admin>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    profile(&token, &users).await
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
