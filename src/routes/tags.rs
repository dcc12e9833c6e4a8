use sqlx::{Pool, Postgres};
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use crate::{
    actions::{get_tag, list_tags},
    error::HtmlError,
    schema::Id,
    server::{json_reply, with_pool},
};

pub fn routes(pool: Pool<Postgres>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(list_handler);

    let detail = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_pool(pool))
        .and_then(detail_handler);

    list.or(detail).unify().boxed()
}

async fn list_handler(pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let tags = list_tags(&pool).await?;
    Ok(json_reply(&tags, StatusCode::OK))
}

async fn detail_handler(id: Id, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    match get_tag(id, &pool).await? {
        Some(tag) => Ok(json_reply(&tag, StatusCode::OK)),
        None => Err(HtmlError::NotFound.new("No tag exists with specified id").into()),
    }
}
