use std::sync::Arc;

use log::*;
use nested_errors::{DbSession, ErrorsAsNestedDicts, JwtManager};
use rocket::{Build, Rocket};
use sqlx::PgPool;

use crate::blocklist::Blocklist;

mod api;
mod blocklist;
mod config;
mod logging;

#[rocket::launch]
async fn rocket() -> _ {
    let config = config::Config::get();

    logging::init_logger(config.verbosity, &config.log_file).expect("Failed to initialize logging");

    debug!("{config:?}");

    let jwt = JwtManager::new(&config.jwt_secret())
        .access_expires(config.access_expires())
        .refresh_expires(config.refresh_expires());

    let mut rocket = rocket::custom(config.get_rocket_config());

    if let Some(db_url) = &config.db_url {
        let db = PgPool::connect(db_url)
            .await
            .expect("Failed to connect to the database");

        debug!("Initialized database connection pool");

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("Failed to apply database migrations");

        info!("Database migrations successfully applied");

        rocket = rocket.manage(db).manage(DbSession::postgres());
    } else {
        warn!("No database configured; notes endpoints will respond with 500");
    }

    build(rocket, jwt, config.rollback_on_500)
}

fn build(rocket: Rocket<Build>, mut jwt: JwtManager, rollback_on_500: bool) -> Rocket<Build> {
    let blocklist = Arc::new(Blocklist::default());

    let revoked = blocklist.clone();
    jwt.token_in_blocklist_loader(move |_, claims| revoked.contains(&claims.jti));

    let rocket = ErrorsAsNestedDicts::new(rollback_on_500).init_app(rocket, Some(&mut jwt));

    jwt.init_app(rocket)
        .manage(blocklist)
        .mount("/api", api::routes())
}
