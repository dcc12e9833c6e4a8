use std::{convert::Infallible, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use thiserror::Error as ThisError;
use tracing_subscriber::{fmt, EnvFilter};
use warp::{
    filters::BoxedFilter,
    http::StatusCode,
    reject::Rejection,
    reply::{self, Response},
    Filter, Reply,
};

use crate::{
    config::{Config, ConfigError},
    constants::BODY_SIZE_LIMIT,
    error::{Error, ErrorBody, HtmlError},
    form::{Form, FormData},
    jwt::SessionKey,
    routes,
};

#[derive(ThisError, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid session key: {0}")]
    SessionKey(#[from] Error),
    #[error("Could not connect to database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Could not apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Could not bind server: {0}")]
    Bind(#[from] warp::Error),
}

pub fn with_pool(
    pool: Pool<Postgres>,
) -> impl Filter<Extract = (Pool<Postgres>,), Error = Infallible> + Clone {
    warp::any().map(move || pool.clone())
}

/// Query string as repeatable key/value pairs.
pub fn with_query() -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::query::<FormData>().map(Form::from_data)
}

pub fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(BODY_SIZE_LIMIT).and(warp::body::json())
}

pub fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(body), status).into_response()
}

pub fn no_content() -> Response {
    reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response()
}

/// Every endpoint under `/api`, without error rendering.
pub fn api(pool: Pool<Postgres>, key: SessionKey) -> BoxedFilter<(Response,)> {
    warp::path("api")
        .and(
            routes::tags::routes(pool.clone())
                .or(routes::ingredients::routes(pool.clone()))
                .unify()
                .or(routes::recipes::routes(pool.clone(), key.clone()))
                .unify()
                .or(routes::users::routes(pool, key))
                .unify(),
        )
        .boxed()
}

/// The served application: routes, error rendering and request logging.
pub fn app(
    pool: Pool<Postgres>,
    key: SessionKey,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    api(pool, key)
        .recover(handle_rejection)
        .unify()
        .with(warp::log("foodgram::api"))
}

fn error_reply(status: StatusCode, detail: String) -> Response {
    json_reply(&ErrorBody { detail }, status)
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(error) = err.find::<Error>() {
        if error.kind == HtmlError::InternalServerError {
            log::error!("Request failed: {error}");
        }
        return Ok(json_reply(&ErrorBody::from(error), error.status()));
    }

    if err.is_not_found() {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            HtmlError::NotFound.to_string(),
        ));
    }

    if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("Malformed request body: {e}"),
        ));
    }

    if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string()));
    }

    if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()));
    }

    if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        return Ok(error_reply(StatusCode::LENGTH_REQUIRED, e.to_string()));
    }

    if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        return Ok(error_reply(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string()));
    }

    if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, e.to_string()));
    }

    log::error!("Unhandled rejection: {err:?}");
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        HtmlError::InternalServerError.to_string(),
    ))
}

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    log::info!("Loading configuration...");
    let config = Config::load()?;
    let key = SessionKey::new(config.secret.as_bytes())?;

    log::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    log::info!("Applying migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    let (address, server) = warp::serve(app(pool, key)).try_bind_with_graceful_shutdown(
        ([0, 0, 0, 0], config.port),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Could not listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            log::info!("Received Ctrl+C, shutting down");
        },
    )?;

    log::info!("Server running on {address}");
    server.await;
    log::info!("Server shut down");

    Ok(())
}
