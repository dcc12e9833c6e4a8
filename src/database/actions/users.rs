use crate::{
    authentication::cryptography::hash_password,
    error::{Error, HtmlError, QueryError},
    form::RegisterForm,
    pagination::{PageContext, Pagination},
    schema::{Id, User, UserProfile, UserProfileRow},
};

use sqlx::{Pool, Postgres};

const PROFILE_COLUMNS: &str = "
    u.email, u.id, u.username, u.first_name, u.last_name,
    EXISTS (SELECT 1 FROM follows f WHERE f.author_id = u.id AND f.user_id = $1) AS is_subscribed
";

pub async fn get_user(pool: &Pool<Postgres>, username: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Creates a user; the stored password is the argon2 hash of the submitted one.
pub async fn register_user(form: &RegisterForm, pool: &Pool<Postgres>) -> Result<User, Error> {
    form.validate()?;

    let password = hash_password(&form.password)
        .map_err(|_| HtmlError::InternalServerError.new("Could not hash password"))?;

    let user: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *;
    ",
    )
    .bind(form.email.trim())
    .bind(form.username.trim())
    .bind(form.first_name.trim())
    .bind(form.last_name.trim())
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    match user {
        Some(user) => {
            log::info!("Registered user {} ({})", user.username, user.id);
            Ok(user)
        }
        None => Err(HtmlError::Conflict.new("A user with that username or email already exists")),
    }
}

pub async fn get_user_profile(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserProfile>, Error> {
    let row: Option<UserProfile> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = $2"
    ))
    .bind(viewer)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_user_profiles(
    user_ids: &[Id],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, Error> {
    let rows: Vec<UserProfile> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = ANY($2)"
    ))
    .bind(viewer)
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn fetch_users(
    viewer: Option<Id>,
    pagination: Pagination,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserProfile>, Error> {
    let rows: Vec<UserProfileRow> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS}, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|p| p.count).unwrap_or(0);
    let page = PageContext::from_rows(rows, total_count, pagination)?;

    Ok(page.map(UserProfile::from))
}

/// Deletes a user and, through the schema's cascades, everything they own.
/// ATTENTION: DOES NOT CHECK FOR PERMISSIONS BY ITSELF
pub async fn delete_user(user_id: Id, pool: &Pool<Postgres>) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No user exists with specified id"));
    }

    log::info!("Deleted user {user_id}");
    Ok(())
}
