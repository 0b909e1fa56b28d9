#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod anchor;
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod store;

pub use config::Config;

use config::{AnchorFairing, ConfigFairing, DatabaseFairing, ServicesFairing};
use logging::LoggerFairing;

/// The server, ready to ignite. Fairings run in the order attached: the
/// services fairing needs the database and anchor managed before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AnchorFairing)
        .attach(ServicesFairing)
}

/// A connection to the database configured for tests.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(db_uri)
        .await
        .expect("could not connect to the test database")
}

/// A fresh database name for one test.
#[cfg(test)]
pub(crate) fn database() -> String {
    config::get_database_name()
}

/// The server over the given test database, anchoring to `anchor`.
#[cfg(test)]
pub(crate) async fn rocket_for_db_and_anchor(
    client: mongodb::Client,
    db_name: &str,
    anchor: anchor::mock::MockAnchor,
) -> Rocket<Build> {
    use std::sync::Arc;

    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("could not create test indexes");
    let store: store::SharedStore = Arc::new(store::MongoStore::new(&db));
    let anchor: anchor::SharedAnchor = Arc::new(anchor);

    let rocket = rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
        .manage(anchor.clone());
    config::manage_services(rocket, store, anchor)
}
