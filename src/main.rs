mod analysis;
mod config;
mod credentials;
mod database;
mod dataset;
mod model;
mod predictor;
mod routes;
mod session;
mod tokens;

use actix_identity::{CookieIdentityPolicy, IdentityService};
use actix_web::{middleware::Logger, web, App, HttpServer};
use config::Config;
use database::SessionDb;
use log::{error, info};
use predictor::Predictor;
use std::io;

fn startup_error<E: std::fmt::Display>(err: E) -> io::Error {
    error!("{}", err);
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::from_env(
        env_logger::Env::default().default_filter_or("cinesense=debug,actix_web=info"),
    )
    .init();

    let config = Config::load().map_err(startup_error)?;

    let tera = tera::Tera::new(&config.templates).map_err(startup_error)?;
    let db = sled::open(&config.data_dir).map_err(startup_error)?;
    if let Some(path) = &config.dataset {
        dataset::import_if_empty(&db, path).map_err(startup_error)?;
    }
    let purged = db
        .purge_sessions(session::now())
        .map_err(startup_error)?;
    info!("purged {} expired sessions", purged);

    let predictor = web::Data::new(
        Predictor::load(&config.model, &config.vectorizer).map_err(startup_error)?,
    );
    info!("loaded sentiment model with classes {:?}", predictor.classes());

    let cookie_key = config.cookie_key;
    let session_ttl = config.session_ttl;
    let bind = config.bind.clone();
    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(IdentityService::new(
                CookieIdentityPolicy::new(&cookie_key)
                    .name("auth-cookie")
                    .max_age(session_ttl)
                    .secure(false),
            ))
            .data(tera.clone())
            .data(db.clone())
            .app_data(predictor.clone())
            .app_data(config.clone())
            .configure(routes::configure)
    })
    .bind(&bind)?
    .run()
    .await
}
