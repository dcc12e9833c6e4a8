use crate::{
    error::{Error, QueryError},
    schema::{Id, LinkedRecipeTag, Tag},
};

use sqlx::{Pool, Postgres};

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

/// Tags linked to any of `recipe_ids`, tagged with the recipe they belong to.
pub async fn list_recipe_tags(
    pool: &Pool<Postgres>,
    recipe_ids: &[Id],
) -> Result<Vec<LinkedRecipeTag>, Error> {
    let list: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id AS recipe_id, t.id AS id, t.name AS name, t.color AS color, t.slug AS slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn create_tag(
    name: &str,
    color: &str,
    slug: &str,
    pool: &Pool<Postgres>,
) -> Result<Tag, Error> {
    let tag: Tag =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *")
            .bind(name)
            .bind(color)
            .bind(slug)
            .fetch_one(pool)
            .await
            .map_err(|e| QueryError::or_conflict(e, "Tag already exists"))?;

    Ok(tag)
}
