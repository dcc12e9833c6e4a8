use crate::{
    error::{Error, QueryError},
    schema::{Id, Ingredient},
};

use sqlx::{Pool, Postgres};

/// Lists ingredients, optionally only those whose name starts with `prefix`
/// (case-insensitive).
pub async fn list_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> = match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prefix) => sqlx::query_as(
            "SELECT * FROM ingredients WHERE LOWER(name) LIKE $1 ORDER BY name, measurement_unit",
        )
        .bind(format!("{}%", escape_like(&prefix.to_lowercase())))
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?,
        None => sqlx::query_as("SELECT * FROM ingredients ORDER BY name, measurement_unit")
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?,
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    let row: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(|e| QueryError::or_conflict(e, "Ingredient already exists"))?;

    Ok(row)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
