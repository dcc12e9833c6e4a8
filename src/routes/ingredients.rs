use sqlx::{Pool, Postgres};
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use crate::{
    actions::{get_ingredient, list_ingredients},
    error::HtmlError,
    form::Form,
    schema::Id,
    server::{json_reply, with_pool, with_query},
};

pub fn routes(pool: Pool<Postgres>) -> BoxedFilter<(Response,)> {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(with_query())
        .and(with_pool(pool.clone()))
        .and_then(list_handler);

    let detail = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_pool(pool))
        .and_then(detail_handler);

    list.or(detail).unify().boxed()
}

/// `?name=` narrows the list to names starting with the given text.
async fn list_handler(form: Form, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let prefix = form.get_str("name");
    let ingredients = list_ingredients(prefix.as_deref(), &pool).await?;
    Ok(json_reply(&ingredients, StatusCode::OK))
}

async fn detail_handler(id: Id, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    match get_ingredient(id, &pool).await? {
        Some(ingredient) => Ok(json_reply(&ingredient, StatusCode::OK)),
        None => Err(HtmlError::NotFound.new("No ingredient exists with specified id").into()),
    }
}
