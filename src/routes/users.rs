use sqlx::{Pool, Postgres};
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use crate::{
    actions::{
        delete_user, fetch_subscriptions, fetch_users, follow_author, get_user_profile,
        register_user, unfollow_author,
    },
    error::{HtmlError, TypeError},
    form::{Form, RegisterForm},
    jwt::{SessionData, SessionKey},
    middleware::{with_possible_session, with_session},
    pagination::Pagination,
    permissions::Policy,
    schema::{Id, UserProfile},
    server::{json_body, json_reply, no_content, with_pool, with_query},
};

pub fn routes(pool: Pool<Postgres>, key: SessionKey) -> BoxedFilter<(Response,)> {
    let list = warp::path!("users")
        .and(warp::get())
        .and(with_query())
        .and(with_possible_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(list_handler);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body::<RegisterForm>())
        .and(with_pool(pool.clone()))
        .and_then(register_handler);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(me_handler);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(with_query())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(subscriptions_handler);

    let detail = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(detail_handler);

    let delete = warp::path!("users" / Id)
        .and(warp::delete())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(delete_handler);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(with_query())
        .and(with_session(key.clone()))
        .and(with_pool(pool.clone()))
        .and_then(subscribe_handler);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(key))
        .and(with_pool(pool))
        .and_then(unsubscribe_handler);

    list.or(register)
        .unify()
        .or(me)
        .unify()
        .or(subscriptions)
        .unify()
        .or(detail)
        .unify()
        .or(delete)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .boxed()
}

fn recipes_limit(form: &Form) -> Result<Option<i64>, TypeError> {
    match form.get_number::<i64>("recipes_limit")? {
        Some(limit) if limit < 0 => Err(TypeError::new("recipes_limit can't be negative")),
        limit => Ok(limit),
    }
}

async fn list_handler(
    form: Form,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let pagination = Pagination::from_form(&form)?;
    let page = fetch_users(session.map(|s| s.user_id), pagination, &pool).await?;
    Ok(json_reply(&page, StatusCode::OK))
}

async fn register_handler(form: RegisterForm, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    let user = register_user(&form, &pool).await?;
    Ok(json_reply(&UserProfile::from(user), StatusCode::CREATED))
}

async fn me_handler(session: SessionData, pool: Pool<Postgres>) -> Result<Response, Rejection> {
    match get_user_profile(session.user_id, Some(session.user_id), &pool).await? {
        Some(profile) => Ok(json_reply(&profile, StatusCode::OK)),
        None => Err(HtmlError::Unauthorized.new("User no longer exists").into()),
    }
}

async fn detail_handler(
    id: Id,
    session: Option<SessionData>,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    match get_user_profile(id, session.map(|s| s.user_id), &pool).await? {
        Some(profile) => Ok(json_reply(&profile, StatusCode::OK)),
        None => Err(HtmlError::NotFound.new("No user exists with specified id").into()),
    }
}

async fn delete_handler(
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    Policy::AdminOnly.check(Some(&session))?;
    delete_user(id, &pool).await?;
    Ok(no_content())
}

async fn subscriptions_handler(
    form: Form,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let pagination = Pagination::from_form(&form)?;
    let limit = recipes_limit(&form)?;

    let page = fetch_subscriptions(&session, pagination, limit, &pool).await?;
    Ok(json_reply(&page, StatusCode::OK))
}

async fn subscribe_handler(
    id: Id,
    form: Form,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    let limit = recipes_limit(&form)?;
    let subscription = follow_author(id, &session, limit, &pool).await?;
    Ok(json_reply(&subscription, StatusCode::CREATED))
}

async fn unsubscribe_handler(
    id: Id,
    session: SessionData,
    pool: Pool<Postgres>,
) -> Result<Response, Rejection> {
    unfollow_author(id, &session, &pool).await?;
    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipes_limit_is_optional() {
        let form = Form::from_data(vec![]);
        assert_eq!(recipes_limit(&form).unwrap(), None);
    }

    #[test]
    fn recipes_limit_rejects_negative() {
        let form = Form::from_data(vec![(String::from("recipes_limit"), String::from("-1"))]);
        assert!(recipes_limit(&form).is_err());
    }
}
