//! Store-backed scenarios. They run against `DATABASE_URL` and are skipped
//! when it is not set.

use std::sync::atomic::{AtomicUsize, Ordering};

use foodgram::{
    actions::{
        add_bookmark, create_ingredient, create_recipe, create_tag, delete_recipe,
        fetch_subscriptions, follow_author, get_recipe_view, is_bookmarked, list_recipe_parts,
        get_user, register_user, remove_bookmark, unfollow_author, update_recipe, Bookmark,
    },
    cryptography::verify_password,
    error::HtmlError,
    form::{IngredientAmount, RecipeForm, RegisterForm},
    jwt::SessionData,
    pagination::Pagination,
    schema::{Id, Ingredient},
    shopping_list::{fetch_shopping_list, ShoppingListRow},
};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}{stamp}x{n}")
}

async fn pool() -> Option<Pool<Postgres>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping store test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(pool)
}

async fn user(pool: &Pool<Postgres>) -> SessionData {
    let name = unique("cook");
    let form = RegisterForm {
        email: format!("{name}@example.com"),
        username: name,
        first_name: String::from("Test"),
        last_name: String::from("Cook"),
        password: String::from("hunter22"),
    };
    let user = register_user(&form, pool).await.unwrap();

    SessionData {
        user_id: user.id,
        username: user.username,
        role: user.role,
        is_superuser: user.is_superuser,
    }
}

async fn ingredient(name: &str, unit: &str, pool: &Pool<Postgres>) -> Ingredient {
    create_ingredient(&unique(name), unit, pool).await.unwrap()
}

fn form(lines: &[(Id, i32)], tags: Vec<Id>) -> RecipeForm {
    RecipeForm {
        ingredients: lines
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
        tags,
        image: String::from("data:image/png;base64,AAAA"),
        name: String::from("Test recipe"),
        text: String::from("Cook it."),
        cooking_time: 10,
    }
}

async fn recipe_count(author: Id, pool: &Pool<Postgres>) -> i64 {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author)
        .fetch_one(pool)
        .await
        .unwrap();
    count.0
}

#[tokio::test]
async fn favorite_twice_is_conflict_and_remove_twice_is_missing() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;
    let salt = ingredient("salt", "g", &pool).await;
    let id = create_recipe(&form(&[(salt.id, 5)], vec![]), &cook, &pool)
        .await
        .unwrap();

    let short = add_bookmark(Bookmark::Favorite, id, &cook, &pool).await.unwrap();
    assert_eq!(short.id, id);

    let error = add_bookmark(Bookmark::Favorite, id, &cook, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::Conflict);

    remove_bookmark(Bookmark::Favorite, id, &cook, &pool).await.unwrap();
    let error = remove_bookmark(Bookmark::Favorite, id, &cook, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::Missing);
}

#[tokio::test]
async fn bookmarking_unknown_recipe_is_not_found() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;

    let error = add_bookmark(Bookmark::ShoppingCart, Id::MAX, &cook, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::NotFound);
}

#[tokio::test]
async fn negative_amount_writes_nothing() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;
    let flour = ingredient("flour", "g", &pool).await;

    let error = create_recipe(&form(&[(flour.id, -1)], vec![]), &cook, &pool)
        .await
        .unwrap_err();

    assert_eq!(error.kind, HtmlError::InvalidRequest);
    assert_eq!(recipe_count(cook.user_id, &pool).await, 0);
}

#[tokio::test]
async fn unknown_ingredient_rolls_back_create() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;

    let error = create_recipe(&form(&[(Id::MAX, 1)], vec![]), &cook, &pool)
        .await
        .unwrap_err();

    assert_eq!(error.kind, HtmlError::NotFound);
    assert_eq!(recipe_count(cook.user_id, &pool).await, 0);
}

#[tokio::test]
async fn failed_update_keeps_composition() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;
    let flour = ingredient("flour", "g", &pool).await;
    let egg = ingredient("egg", "pcs", &pool).await;
    let slug = unique("tag");
    let color = format!("#{:06X}", chrono::Utc::now().timestamp_subsec_nanos() % 0x1000000);
    let tag = create_tag(&slug, &color, &slug, &pool).await.unwrap();

    let id = create_recipe(&form(&[(flour.id, 200)], vec![tag.id]), &cook, &pool)
        .await
        .unwrap();
    let before = list_recipe_parts(&pool, &[id]).await.unwrap();

    let duplicate = form(&[(egg.id, 1), (egg.id, 2)], vec![]);
    let error = update_recipe(id, &duplicate, &cook, &pool).await.unwrap_err();
    assert_eq!(error.kind, HtmlError::InvalidRequest);

    let missing = form(&[(egg.id, 1), (Id::MAX, 2)], vec![]);
    let error = update_recipe(id, &missing, &cook, &pool).await.unwrap_err();
    assert_eq!(error.kind, HtmlError::NotFound);

    let view = get_recipe_view(id, None, &pool).await.unwrap().unwrap();
    assert_eq!(list_recipe_parts(&pool, &[id]).await.unwrap(), before);
    assert_eq!(view.tags.len(), 1);
    assert_eq!(view.tags[0].id, tag.id);
}

#[tokio::test]
async fn update_by_another_user_is_forbidden() {
    let Some(pool) = pool().await else { return };
    let owner = user(&pool).await;
    let other = user(&pool).await;
    let milk = ingredient("milk", "cup", &pool).await;

    let id = create_recipe(&form(&[(milk.id, 1)], vec![]), &owner, &pool)
        .await
        .unwrap();

    let error = update_recipe(id, &form(&[(milk.id, 2)], vec![]), &other, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::Forbidden);

    let error = delete_recipe(id, &other, &pool).await.unwrap_err();
    assert_eq!(error.kind, HtmlError::Forbidden);
}

#[tokio::test]
async fn shopping_list_sums_cart_recipes() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;
    let flour = ingredient("flour", "g", &pool).await;
    let egg = ingredient("egg", "pcs", &pool).await;
    let milk = ingredient("milk", "cup", &pool).await;

    let first = create_recipe(&form(&[(flour.id, 200), (egg.id, 2)], vec![]), &cook, &pool)
        .await
        .unwrap();
    let second = create_recipe(&form(&[(flour.id, 100), (milk.id, 1)], vec![]), &cook, &pool)
        .await
        .unwrap();

    assert!(fetch_shopping_list(cook.user_id, &pool).await.unwrap().is_empty());

    add_bookmark(Bookmark::ShoppingCart, first, &cook, &pool).await.unwrap();
    add_bookmark(Bookmark::ShoppingCart, second, &cook, &pool).await.unwrap();

    let mut expected = vec![
        ShoppingListRow {
            name: egg.name.clone(),
            amount: 2,
            measurement_unit: egg.measurement_unit.clone(),
        },
        ShoppingListRow {
            name: flour.name.clone(),
            amount: 300,
            measurement_unit: flour.measurement_unit.clone(),
        },
        ShoppingListRow {
            name: milk.name.clone(),
            amount: 1,
            measurement_unit: milk.measurement_unit.clone(),
        },
    ];
    expected.sort_by(|a, b| a.name.cmp(&b.name));

    let list = fetch_shopping_list(cook.user_id, &pool).await.unwrap();
    assert_eq!(list, expected);
    assert_eq!(fetch_shopping_list(cook.user_id, &pool).await.unwrap(), list);
}

#[tokio::test]
async fn deleting_recipe_clears_bookmarks() {
    let Some(pool) = pool().await else { return };
    let cook = user(&pool).await;
    let fan = user(&pool).await;
    let rice = ingredient("rice", "g", &pool).await;

    let id = create_recipe(&form(&[(rice.id, 100)], vec![]), &cook, &pool)
        .await
        .unwrap();
    add_bookmark(Bookmark::Favorite, id, &fan, &pool).await.unwrap();
    add_bookmark(Bookmark::ShoppingCart, id, &fan, &pool).await.unwrap();

    delete_recipe(id, &cook, &pool).await.unwrap();

    assert!(!is_bookmarked(Bookmark::Favorite, id, fan.user_id, &pool).await.unwrap());
    assert!(!is_bookmarked(Bookmark::ShoppingCart, id, fan.user_id, &pool).await.unwrap());
    assert!(fetch_shopping_list(fan.user_id, &pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn follow_lifecycle() {
    let Some(pool) = pool().await else { return };
    let reader = user(&pool).await;
    let author = user(&pool).await;
    let oats = ingredient("oats", "g", &pool).await;

    for _ in 0..3 {
        create_recipe(&form(&[(oats.id, 50)], vec![]), &author, &pool)
            .await
            .unwrap();
    }

    let card = follow_author(author.user_id, &reader, Some(2), &pool)
        .await
        .unwrap();
    assert!(card.is_subscribed);
    assert_eq!(card.recipes_count, 3);
    assert_eq!(card.recipes.len(), 2);

    let error = follow_author(author.user_id, &reader, None, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::Conflict);

    let page = fetch_subscriptions(&reader, Pagination::default(), None, &pool)
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].id, author.user_id);
    assert_eq!(page.results[0].recipes.len(), 3);

    let error = fetch_subscriptions(&reader, Pagination { page: 2, limit: 6 }, None, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::NotFound);

    unfollow_author(author.user_id, &reader, &pool).await.unwrap();
    let error = unfollow_author(author.user_id, &reader, &pool)
        .await
        .unwrap_err();
    assert_eq!(error.kind, HtmlError::Missing);
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let Some(pool) = pool().await else { return };
    let name = unique("twin");
    let form = RegisterForm {
        email: format!("{name}@example.com"),
        username: name.clone(),
        first_name: String::from("A"),
        last_name: String::from("B"),
        password: String::from("pw"),
    };
    register_user(&form, &pool).await.unwrap();

    let stored = get_user(&pool, &name).await.unwrap().unwrap();
    assert_ne!(stored.password, "pw");
    assert!(verify_password("pw", &stored.password).unwrap());

    let error = register_user(
        &RegisterForm {
            email: format!("other{name}@example.com"),
            ..form
        },
        &pool,
    )
    .await
    .unwrap_err();
    assert_eq!(error.kind, HtmlError::Conflict);
}
