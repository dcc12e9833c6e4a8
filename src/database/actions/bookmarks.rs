use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    schema::{Id, ShoppingCartLine, ShortRecipe},
};

use super::{get_recipe, get_short_recipe};
use sqlx::{Pool, Postgres};

/// Per-user recipe lists that share the same `(user_id, recipe_id)` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bookmark {
    Favorite,
    ShoppingCart,
}

impl Bookmark {
    fn table(&self) -> &'static str {
        match self {
            Bookmark::Favorite => "favorites",
            Bookmark::ShoppingCart => "shopping_cart",
        }
    }

    fn action(&self) -> ActionType {
        match self {
            Bookmark::Favorite => ActionType::ManageOwnFavorites,
            Bookmark::ShoppingCart => ActionType::ManageOwnShoppingCart,
        }
    }

    pub fn already_present(&self) -> &'static str {
        match self {
            Bookmark::Favorite => "Recipe is already in favorites",
            Bookmark::ShoppingCart => "Recipe is already in the shopping cart",
        }
    }

    pub fn not_present(&self) -> &'static str {
        match self {
            Bookmark::Favorite => "Recipe is not in favorites",
            Bookmark::ShoppingCart => "Recipe is not in the shopping cart",
        }
    }
}

pub async fn is_bookmarked(
    kind: Bookmark,
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let result: Option<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE recipe_id = $1 AND user_id = $2",
        kind.table()
    ))
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(result.is_some())
}

/// Adds a recipe to one of the session's lists. A pair that is already there
/// is a `Conflict`; the unique key decides, so concurrent duplicates lose the
/// same way.
pub async fn add_bookmark(
    kind: Bookmark,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    session.authenticate(kind.action())?;

    let recipe = get_short_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe exists with specified id"))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        kind.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| QueryError::or_conflict(e, kind.already_present()))?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new(kind.already_present()));
    }

    Ok(recipe)
}

pub async fn remove_bookmark(
    kind: Bookmark,
    recipe_id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(kind.action())?;

    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(HtmlError::NotFound.new("No recipe exists with specified id"));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        kind.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::Missing.new(kind.not_present()));
    }

    Ok(())
}

/// Every ingredient line of every recipe in the user's shopping cart, unmerged.
pub async fn list_shopping_cart_lines(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingCartLine>, Error> {
    let rows: Vec<ShoppingCartLine> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_cart c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}
