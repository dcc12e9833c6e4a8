use sqlx::{Pool, Postgres};
use warp::{
    filters::BoxedFilter,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    reject::Rejection,
    reply::Response,
    Filter,
};

use crate::{
    actions::{
        add_bookmark, create_recipe, delete_recipe, fetch_recipes, get_recipe_view,
        remove_bookmark, update_recipe, Bookmark, RecipeFilter,
    },
    error::HtmlError,
    form::{Form, RecipeForm},
    jwt::{SessionData, SessionKey},
    middleware::{with_possible_session, with_session},
    pagination::Pagination,
    schema::Id,
    server::{json_body, json_reply, no_content, with_pool, with_query},
    shopping_list::{attachment_filename, fetch_shopping_list, render_csv},
};

pub fn routes(pool: Pool<Postgres>, key: SessionKey) -> BoxedFilter<(Response,)> {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(with_query())
        .and(with_possible_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(list_handler);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_pool(pool.clone()))
        .and_then(create_handler);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(download_handler);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(detail_handler);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(key.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_pool(pool.clone()))
        .and_then(update_handler);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(delete_handler);

    let favorite = bookmark_routes("favorite", Bookmark::Favorite, pool.clone(), key.clone());
    let cart = bookmark_routes("shopping_cart", Bookmark::ShoppingCart, pool, key);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(cart)
        .unify()
        .boxed()
}

/// `POST` and `DELETE` on `/recipes/{id}/<segment>`.
fn bookmark_routes(
    segment: &'static str,
    kind: Bookmark,
    pool: Pool<Postgres>,
    key: SessionKey,
) -> BoxedFilter<(Response,)> {
    let path = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(move |id: Id, session: SessionData, pool: Pool<Postgres>| async move {
            let recipe = add_bookmark(kind, id, &session, &pool).await?;
            Ok::<_, Rejection>(json_reply(&recipe, StatusCode::CREATED))
        });

    let remove = path
        .and(warp::delete())
        .and(with_session(key))
        .and(with_pool(pool))
        .and_then(move |id: Id, session: SessionData, pool: Pool<Postgres>| async move {
            remove_bookmark(kind, id, &session, &pool).await?;
            Ok::<_, Rejection>(no_content())
        });

    add.or(remove).unify().boxed()
}

async fn list_handler(
    form: Form,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let pagination = Pagination::from_form(&form)?;
    let filter = RecipeFilter::from_form(&form)?;
    let viewer = session.map(|s| s.user_id);

    let page = fetch_recipes(&filter, viewer, pagination, &pool).await?;
    Ok(json_reply(&page, StatusCode::OK))
}

async fn detail_handler(
    id: Id,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    match get_recipe_view(id, session.map(|s| s.user_id), &pool).await? {
        Some(recipe) => Ok(json_reply(&recipe, StatusCode::OK)),
        None => Err(HtmlError::NotFound.new("No recipe exists with specified id").into()),
    }
}

async fn recipe_reply(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
    status: StatusCode,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_view(id, Some(session.user_id), pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))?;
    Ok(json_reply(&recipe, status))
}

async fn create_handler(
    session: SessionData,
    form: RecipeForm,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let id = create_recipe(&form, &session, &pool).await?;
    recipe_reply(id, &session, &pool, StatusCode::CREATED).await
}

async fn update_handler(
    id: Id,
    session: SessionData,
    form: RecipeForm,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    update_recipe(id, &form, &session, &pool).await?;
    recipe_reply(id, &session, &pool, StatusCode::OK).await
}

async fn delete_handler(
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    delete_recipe(id, &session, &pool).await?;
    Ok(no_content())
}

async fn download_handler(session: SessionData, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let rows = fetch_shopping_list(session.user_id, &pool).await?;
    let body = render_csv(&rows)?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_filename(&session.username)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| HtmlError::InternalServerError.new("Invalid attachment name"))?;

    let mut response = Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(CONTENT_DISPOSITION, disposition);

    log::info!(
        "User {} downloaded a shopping list of {} lines",
        session.user_id,
        rows.len()
    );
    Ok(response)
}
