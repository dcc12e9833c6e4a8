use std::collections::HashMap;

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    schema::{AuthoredShortRecipe, Id, ShortRecipe, Subscription, SubscriptionRow},
};

use super::get_user_by_id;
use sqlx::{Pool, Postgres};

pub async fn follow_author(
    author_id: Id,
    session: &SessionData,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    if author_id == session.user_id {
        return Err(HtmlError::InvalidRequest.new("You can't subscribe to yourself"));
    }

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(HtmlError::NotFound.new("No user exists with specified id"));
    }

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::or_conflict(e, "Subscription already exists"))?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new("Subscription already exists"));
    }

    let row: SubscriptionRow = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            1::BIGINT AS count
        FROM users u
        WHERE u.id = $1
    ",
    )
    .bind(author_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    log::info!("User {} subscribed to {}", session.user_id, author_id);

    build_subscriptions(vec![row], recipes_limit, pool)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::InternalServerError.new("Subscription vanished"))
}

pub async fn unfollow_author(
    author_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(HtmlError::NotFound.new("No user exists with specified id"));
    }

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::Missing.new("You are not subscribed to this user"));
    }

    log::info!("User {} unsubscribed from {}", session.user_id, author_id);
    Ok(())
}

/// Authors the session follows, each with up to `recipes_limit` of their
/// newest recipes.
pub async fn fetch_subscriptions(
    session: &SessionData,
    pagination: Pagination,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Subscription>, Error> {
    let rows: Vec<SubscriptionRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let subscriptions = build_subscriptions(rows, recipes_limit, pool).await?;

    PageContext::from_rows(subscriptions, total_count, pagination)
}

async fn build_subscriptions(
    rows: Vec<SubscriptionRow>,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Subscription>, Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let author_ids: Vec<Id> = rows.iter().map(|r| r.id).collect();
    let recipes: Vec<AuthoredShortRecipe> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM (
            SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created_at DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY author_id, position
    ",
    )
    .bind(author_ids.as_slice())
    .bind(recipes_limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut by_author: HashMap<Id, Vec<ShortRecipe>> = HashMap::new();
    recipes.into_iter().for_each(|recipe| {
        by_author
            .entry(recipe.author_id)
            .or_default()
            .push(recipe.into())
    });

    Ok(rows
        .into_iter()
        .map(|row| Subscription {
            recipes: by_author.remove(&row.id).unwrap_or_default(),
            email: row.email,
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: true,
            recipes_count: row.recipes_count,
        })
        .collect())
}
