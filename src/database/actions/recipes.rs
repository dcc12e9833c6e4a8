use std::collections::HashMap;

use crate::{
    authentication::permissions::{ActionType, Policy},
    error::{Error, HtmlError, QueryError, TypeError},
    form::{Form, RecipeForm},
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    schema::{Id, Recipe, RecipePart, RecipeRow, RecipeView, ShortRecipe, Tag, UserProfile},
};

use super::{list_recipe_tags, list_user_profiles};
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

/// Narrowing applied to the recipe listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches if it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_form(form: &Form) -> Result<Self, TypeError> {
        Ok(Self {
            author: form.get_number("author")?,
            tags: form.get_all("tags"),
            is_favorited: form.get_flag("is_favorited")?,
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart")?,
        })
    }
}

fn recipe_query<'a>(viewer: Option<Id>) -> QueryBuilder<'a, Postgres> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, r.created_at, \
         EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
    );
    query
        .push_bind(viewer)
        .push(
            ") AS is_favorited, \
             EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ",
        )
        .push_bind(viewer)
        .push(") AS is_in_shopping_cart, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    query
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Id>,
    pagination: Pagination,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeView>, Error> {
    let mut query = recipe_query(viewer);

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    // both flags mean nothing without a user to look them up for
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query
                .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query
                .push(" AND EXISTS (SELECT 1 FROM shopping_cart c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }

    query
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let views = assemble_recipe_views(rows, viewer, pool).await?;

    PageContext::from_rows(views, total_count, pagination)
}

pub async fn get_recipe_view(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeView>, Error> {
    let mut query = recipe_query(viewer);
    query.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query
        .build_query_as()
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    match row {
        Some(row) => Ok(assemble_recipe_views(vec![row], viewer, pool).await?.pop()),
        None => Ok(None),
    }
}

/// Joins listing rows with their ingredient lines, tags and authors.
async fn assemble_recipe_views(
    rows: Vec<RecipeRow>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeView>, Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = rows.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<Id> = rows.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut parts: HashMap<Id, Vec<RecipePart>> = HashMap::new();
    list_recipe_parts(pool, &ids)
        .await?
        .into_iter()
        .for_each(|part| parts.entry(part.recipe_id).or_default().push(part));

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    list_recipe_tags(pool, &ids)
        .await?
        .into_iter()
        .for_each(|tag| tags.entry(tag.recipe_id).or_default().push(tag.into()));

    let authors: HashMap<Id, UserProfile> = list_user_profiles(&author_ids, viewer, pool)
        .await?
        .into_iter()
        .map(|author| (author.id, author))
        .collect();

    rows.into_iter()
        .map(|row| {
            let author = authors
                .get(&row.author_id)
                .cloned()
                .ok_or_else(|| HtmlError::InternalServerError.new("Recipe author is missing"))?;

            Ok(RecipeView {
                id: row.id,
                tags: tags.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: parts.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                name: row.name,
                image: row.image,
                text: row.text,
                cooking_time: row.cooking_time,
            })
        })
        .collect()
}

pub async fn list_recipe_parts(
    pool: &Pool<Postgres>,
    recipe_ids: &[Id],
) -> Result<Vec<RecipePart>, Error> {
    let rows: Vec<RecipePart> = sqlx::query_as("
        SELECT ri.recipe_id AS recipe_id, i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name, i.measurement_unit
    ")
    .bind(recipe_ids)
    .fetch_all(pool).await.map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_short_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<ShortRecipe>, Error> {
    let row: Option<ShortRecipe> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session is allowed to modify.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match get_recipe(id, pool).await? {
        Some(recipe) => {
            Policy::OwnerOrAdmin(recipe.author_id).check(Some(session))?;
            Ok(recipe)
        }
        None => Err(HtmlError::NotFound.new("No recipe exists with specified id")),
    }
}

pub async fn create_recipe(
    form: &RecipeForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Id, Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    form.validate()?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    ensure_references(&mut tr, form).await?;

    let recipe: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(session.user_id)
    .bind(form.name.trim())
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    replace_composition(&mut tr, recipe.0, form).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("User {} created recipe {}", session.user_id, recipe.0);
    Ok(recipe.0)
}

/// Replaces the scalar fields, ingredient lines and tag links of a recipe in
/// one transaction. Nothing is written if validation fails.
pub async fn update_recipe(
    id: Id,
    form: &RecipeForm,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;
    form.validate()?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()))?;

    ensure_references(&mut tr, form).await?;

    let result = sqlx::query(
        "UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5",
    )
    .bind(form.name.trim())
    .bind(&form.image)
    .bind(&form.text)
    .bind(form.cooking_time)
    .bind(recipe.id)
    .execute(&mut *tr)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
    }

    replace_composition(&mut tr, recipe.id, form).await?;

    tr.commit()
        .await
        .map_err(|_| QueryError::new("Could not commit transaction".to_owned()))?;

    log::info!("User {} updated recipe {}", session.user_id, recipe.id);
    Ok(())
}

/// Deletes a recipe; its lines, tag links, favorites and cart entries go with it.
pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    log::info!("User {} deleted recipe {}", session.user_id, recipe.id);
    Ok(())
}

async fn ensure_references(
    tr: &mut Transaction<'_, Postgres>,
    form: &RecipeForm,
) -> Result<(), Error> {
    let ingredient_ids = form.ingredient_ids();
    let found: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(ingredient_ids.as_slice())
        .fetch_one(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    if found.0 != ingredient_ids.len() as i64 {
        return Err(HtmlError::NotFound.new("Ingredient does not exist"));
    }

    if !form.tags.is_empty() {
        let found: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
            .bind(form.tags.as_slice())
            .fetch_one(&mut **tr)
            .await
            .map_err(QueryError::from)?;

        if found.0 != form.tags.len() as i64 {
            return Err(HtmlError::NotFound.new("Tag does not exist"));
        }
    }

    Ok(())
}

async fn replace_composition(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    form: &RecipeForm,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(form.ingredients.iter(), |mut b, line| {
        b.push_bind(recipe_id)
            .push_bind(line.id)
            .push_bind(line.amount);
    });
    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::or_conflict(e, "Duplicate ingredient in recipe"))?;

    if !form.tags.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        query_builder.push_values(form.tags.iter(), |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });
        query_builder
            .build()
            .execute(&mut **tr)
            .await
            .map_err(|e| QueryError::or_conflict(e, "Duplicate tag in recipe"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_read_from_query() {
        let form = Form::from_data(vec![
            (String::from("author"), String::from("4")),
            (String::from("tags"), String::from("breakfast")),
            (String::from("tags"), String::from("dinner")),
            (String::from("is_in_shopping_cart"), String::from("1")),
        ]);

        let filter = RecipeFilter::from_form(&form).unwrap();
        assert_eq!(
            filter,
            RecipeFilter {
                author: Some(4),
                tags: vec![String::from("breakfast"), String::from("dinner")],
                is_favorited: false,
                is_in_shopping_cart: true,
            }
        );
    }

    #[test]
    fn empty_query_is_unfiltered() {
        let filter = RecipeFilter::from_form(&Form::from_data(vec![])).unwrap();
        assert_eq!(filter, RecipeFilter::default());
    }

    #[test]
    fn anonymous_listing_binds_no_user() {
        let query = recipe_query(None);
        let sql = query.sql();

        assert!(sql.contains("AS is_favorited"));
        assert!(sql.contains("AS is_in_shopping_cart"));
        assert!(sql.ends_with("FROM recipes r WHERE TRUE"));
    }
}
