use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use mongodb::{bson::doc, Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    anchor::{HttpAnchor, SharedAnchor},
    error::Error,
    model::{
        api::auth::{Credentials, Rights},
        db::user::{NewUser, User},
        mongodb::{ensure_indexes_exist, Coll, Id},
    },
    protocol::{CommitReveal, Finalizer, Verifier},
    store::{MongoStore, SharedStore},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// An admin account created at startup if no user of that name exists yet.
#[derive(Deserialize)]
struct BootstrapAdmin {
    username: String,
    password: String,
    rt_id: String,
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
    // non-secrets
    #[serde(default)]
    bootstrap_admin: Option<BootstrapAdmin>,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }

        // Ensure the configured admin exists.
        if let Some(admin) = config.bootstrap_admin {
            if let Err(e) = ensure_admin_exists(&db, admin).await {
                error!("Failed to bootstrap admin user: {e}");
                return Err(rocket);
            }
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Insert the bootstrap admin unless a user with that name already exists.
async fn ensure_admin_exists(db: &Database, admin: BootstrapAdmin) -> Result<(), Error> {
    let users = Coll::<User>::from_db(db);
    if users
        .find_one(doc! {"username": &admin.username}, None)
        .await?
        .is_some()
    {
        debug!("Bootstrap admin {} already exists", admin.username);
        return Ok(());
    }

    let rt_id = admin
        .rt_id
        .parse::<Id>()
        .map_err(|_| Error::Validation(format!("malformed bootstrap RT ID {:?}", admin.rt_id)))?;
    let new_admin = Credentials {
        username: admin.username,
        password: admin.password,
    }
    .into_user(Rights::Admin, rt_id)?;
    Coll::<NewUser>::from_db(db)
        .insert_one(&new_admin, None)
        .await?;
    warn!(
        "Created bootstrap admin {} for RT {rt_id}",
        new_admin.username
    );
    Ok(())
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
pub(crate) fn get_database_name() -> String {
    "rtvote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

fn default_anchor_timeout() -> u64 {
    10
}

/// Configuration for the ledger anchor service.
#[derive(Deserialize)]
struct AnchorConfig {
    // non-secrets
    anchor_url: String,
    #[serde(default = "default_anchor_timeout")]
    anchor_timeout: u64,
    // secrets
    #[serde(default)]
    anchor_api_key: Option<String>,
}

/// A fairing that loads the anchor config and places a [`SharedAnchor`]
/// into managed state.
pub struct AnchorFairing;

#[rocket::async_trait]
impl Fairing for AnchorFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger anchor",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<AnchorConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load anchor config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the client.
        let anchor = match HttpAnchor::new(
            &config.anchor_url,
            config.anchor_api_key,
            StdDuration::from_secs(config.anchor_timeout),
        ) {
            Ok(anchor) => anchor,
            Err(e) => {
                error!("Failed to construct anchor client: {e}");
                return Err(rocket);
            }
        };
        info!("Anchoring fingerprints via {}", config.anchor_url);

        // Manage the state.
        let anchor: SharedAnchor = Arc::new(anchor);
        rocket = rocket.manage(anchor);
        Ok(rocket)
    }
}

/// A fairing that wires the voting protocol services from the managed
/// database and anchor. Must be attached after [`DatabaseFairing`] and
/// [`AnchorFairing`].
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let db = match rocket.state::<Database>() {
            Some(db) => db.clone(),
            None => {
                error!("Voting services need a database; attach DatabaseFairing first");
                return Err(rocket);
            }
        };
        let anchor = match rocket.state::<SharedAnchor>() {
            Some(anchor) => anchor.clone(),
            None => {
                error!("Voting services need an anchor; attach AnchorFairing first");
                return Err(rocket);
            }
        };
        let store: SharedStore = Arc::new(MongoStore::new(&db));
        Ok(manage_services(rocket, store, anchor))
    }
}

/// Place the voting protocol services into managed state.
pub(crate) fn manage_services(
    rocket: Rocket<Build>,
    store: SharedStore,
    anchor: SharedAnchor,
) -> Rocket<Build> {
    rocket
        .manage(CommitReveal::new(store.clone()))
        .manage(Finalizer::new(store.clone(), anchor.clone()))
        .manage(Verifier::new(store, anchor))
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                auth_ttl: 3600,
                jwt_secret: "correct horse battery staple".to_string(),
            }
        }
    }
}
