use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{FromRef, Path, State},
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{Query, WithRejection};
use fg::basic_models::{RecipeForWrite, RecipePatch};
use serde::Deserialize;

use crate::auth::{Actor, CurrentUser};
use crate::cache::{evict, ImageCache};
use crate::config::ApiConfig;
use crate::database::Database;
use crate::errors::{WebError, WebResult};
use crate::media::Image;
use crate::models::{Follow, Ingredient, Recipe, RecipeFilter, RecipeLink, Tag, User};
use crate::shopping;
use crate::views::{Page, PageRequest, RecipeView, ShortRecipe, SubscriptionView, UserView};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: ImageCache,
    pub api: Arc<ApiConfig>,
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

/// Build the whole application, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        // `GET /health` goes to `health`
        .route("/health", get(health))
        .route("/api/ingredients/", get(list_ingredients))
        .route("/api/ingredients/:ingredient_id/", get(get_ingredient))
        .route("/api/tags/", get(list_tags))
        .route("/api/tags/:tag_id/", get(get_tag))
        .route("/api/recipes/", get(list_recipes).post(create_recipe))
        // Must not be shadowed by `/api/recipes/:recipe_id/`
        .route(
            "/api/recipes/download_shopping_cart/",
            get(download_shopping_cart),
        )
        .route(
            "/api/recipes/:recipe_id/",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/api/recipes/:recipe_id/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/api/recipes/:recipe_id/shopping_cart/",
            post(add_to_shopping_cart).delete(remove_from_shopping_cart),
        )
        .route("/api/users/", get(list_users))
        .route("/api/users/me/", get(me))
        .route("/api/users/subscriptions/", get(subscriptions))
        .route("/api/users/:user_id/", get(get_user))
        .route(
            "/api/users/:user_id/subscribe/",
            post(subscribe).delete(unsubscribe),
        )
        // `GET /media/images/:image_id` goes to `get_image`
        .route("/media/images/:image_id", get(get_image))
        .layer(
            tower_http::compression::CompressionLayer::new()
                .quality(tower_http::CompressionLevel::Fastest),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// Just reply that everything is okay
async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct IngredientQuery {
    name: Option<String>,
}

async fn list_ingredients(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<IngredientQuery>, WebError>,
) -> WebResult<Json<Vec<Ingredient>>> {
    Ok(Json(Ingredient::search(&state.db, query.name.as_deref())?))
}

async fn get_ingredient(
    State(state): State<AppState>,
    Path(ingredient_id): Path<i64>,
) -> WebResult<Json<Ingredient>> {
    let ingredient = Ingredient::get_by_id(&state.db, ingredient_id)?.ok_or(WebError::NotFound)?;
    Ok(Json(ingredient))
}

async fn list_tags(State(state): State<AppState>) -> WebResult<Json<Vec<Tag>>> {
    Ok(Json(Tag::list_all(&state.db)?))
}

async fn get_tag(State(state): State<AppState>, Path(tag_id): Path<i64>) -> WebResult<Json<Tag>> {
    Ok(Json(Tag::get_by_id(&state.db, tag_id)?.ok_or(WebError::NotFound)?))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RecipeQuery {
    #[serde(default)]
    tags: Vec<String>,
    author: Option<i64>,
    is_favorited: Option<String>,
    is_in_shopping_cart: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// `1` and `true` switch a filter on. Anything else leaves it off.
fn flag_enabled(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

async fn list_recipes(
    State(state): State<AppState>,
    actor: Actor,
    uri: Uri,
    WithRejection(Query(query), _): WithRejection<Query<RecipeQuery>, WebError>,
) -> WebResult<Json<Page<RecipeView>>> {
    let request = PageRequest::new(query.page, query.limit, &state.api)?;
    let filter = RecipeFilter {
        is_favorited: flag_enabled(query.is_favorited.as_deref()),
        is_in_shopping_cart: flag_enabled(query.is_in_shopping_cart.as_deref()),
        tags: query.tags,
        author: query.author,
    };
    let viewer = actor.user_id();
    let conn = state.db.pool.get()?;
    let (count, recipes) =
        Recipe::list_page(&conn, &filter, viewer, request.offset(), request.limit)?;
    let results = recipes
        .into_iter()
        .map(|recipe| RecipeView::build(&conn, recipe, viewer))
        .collect::<WebResult<Vec<_>>>()?;
    Ok(Json(Page::new(count, results, request, &uri)?))
}

async fn create_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    WithRejection(Json(upload), _): WithRejection<Json<RecipeForWrite>, WebError>,
) -> WebResult<(StatusCode, Json<RecipeView>)> {
    let (db, api, user_id) = (state.db.clone(), state.api.clone(), user.id);
    // Decoding and re-encoding the image is CPU bound
    let recipe = tokio::task::spawn_blocking(move || Recipe::create(&db, user_id, upload, &api))
        .await
        .context("Running recipe create")??;
    let conn = state.db.pool.get()?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeView::build(&conn, recipe, Some(user.id))?),
    ))
}

async fn get_recipe(
    State(state): State<AppState>,
    actor: Actor,
    Path(recipe_id): Path<i64>,
) -> WebResult<Json<RecipeView>> {
    let conn = state.db.pool.get()?;
    let recipe = Recipe::get_by_id(&conn, recipe_id)?.ok_or(WebError::NotFound)?;
    Ok(Json(RecipeView::build(&conn, recipe, actor.user_id())?))
}

async fn update_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
    WithRejection(Json(patch), _): WithRejection<Json<RecipePatch>, WebError>,
) -> WebResult<Json<RecipeView>> {
    let (db, api, user_id) = (state.db.clone(), state.api.clone(), user.id);
    let update = tokio::task::spawn_blocking(move || {
        Recipe::update(&db, user_id, recipe_id, patch, &api)
    })
    .await
    .context("Running recipe update")??;
    evict(&state.cache, update.replaced_image);
    let conn = state.db.pool.get()?;
    Ok(Json(RecipeView::build(&conn, update.recipe, Some(user.id))?))
}

async fn delete_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<StatusCode> {
    let image_id = Recipe::delete(&state.db, user.id, recipe_id)?;
    evict(&state.cache, image_id);
    Ok(StatusCode::NO_CONTENT)
}

fn add_link(
    state: &AppState,
    link: RecipeLink,
    user: &User,
    recipe_id: i64,
) -> WebResult<(StatusCode, Json<ShortRecipe>)> {
    let recipe = link.add(&state.db, user.id, recipe_id)?;
    Ok((StatusCode::CREATED, Json(recipe.into())))
}

async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<(StatusCode, Json<ShortRecipe>)> {
    add_link(&state, RecipeLink::Favorite, &user, recipe_id)
}

async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<StatusCode> {
    RecipeLink::Favorite.remove(&state.db, user.id, recipe_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<(StatusCode, Json<ShortRecipe>)> {
    add_link(&state, RecipeLink::ShoppingCart, &user, recipe_id)
}

async fn remove_from_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(recipe_id): Path<i64>,
) -> WebResult<StatusCode> {
    RecipeLink::ShoppingCart.remove(&state.db, user.id, recipe_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// The summed ingredients of everything in the caller's cart, as a text file.
async fn download_shopping_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> WebResult<impl IntoResponse> {
    let conn = state.db.pool.get()?;
    let report = shopping::render(&shopping::aggregate(&conn, user.id)?);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_cart.txt\"",
            ),
        ],
        report,
    ))
}

async fn list_users(
    State(state): State<AppState>,
    actor: Actor,
    uri: Uri,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, WebError>,
) -> WebResult<Json<Page<UserView>>> {
    let request = PageRequest::new(query.page, query.limit, &state.api)?;
    let conn = state.db.pool.get()?;
    let (count, users) = User::list_page(&conn, request.offset(), request.limit)?;
    let results = users
        .into_iter()
        .map(|user| UserView::build(&conn, user, actor.user_id()))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(Page::new(count, results, request, &uri)?))
}

async fn get_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(user_id): Path<i64>,
) -> WebResult<Json<UserView>> {
    let conn = state.db.pool.get()?;
    let user = User::get_by_id(&conn, user_id)?.ok_or(WebError::NotFound)?;
    Ok(Json(UserView::build(&conn, user, actor.user_id())?))
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> WebResult<Json<UserView>> {
    let conn = state.db.pool.get()?;
    let viewer = Some(user.id);
    Ok(Json(UserView::build(&conn, user, viewer)?))
}

#[derive(Debug, Deserialize)]
struct RecipesLimitQuery {
    recipes_limit: Option<u32>,
}

async fn subscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(author_id): Path<i64>,
    WithRejection(Query(query), _): WithRejection<Query<RecipesLimitQuery>, WebError>,
) -> WebResult<(StatusCode, Json<SubscriptionView>)> {
    Follow::add(&state.db, user.id, author_id)?;
    let conn = state.db.pool.get()?;
    let author = User::get_by_id(&conn, author_id)?.ok_or(WebError::NotFound)?;
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionView::build(
            &conn,
            author,
            Some(user.id),
            query.recipes_limit,
        )?),
    ))
}

async fn unsubscribe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(author_id): Path<i64>,
) -> WebResult<StatusCode> {
    Follow::remove(&state.db, user.id, author_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SubscriptionsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    recipes_limit: Option<u32>,
}

async fn subscriptions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    uri: Uri,
    WithRejection(Query(query), _): WithRejection<Query<SubscriptionsQuery>, WebError>,
) -> WebResult<Json<Page<SubscriptionView>>> {
    let request = PageRequest::new(query.page, query.limit, &state.api)?;
    let conn = state.db.pool.get()?;
    let (count, authors) =
        Follow::following_page(&conn, user.id, request.offset(), request.limit)?;
    let results = authors
        .into_iter()
        .map(|author| SubscriptionView::build(&conn, author, Some(user.id), query.recipes_limit))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(Page::new(count, results, request, &uri)?))
}

async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> WebResult<impl IntoResponse> {
    let bytes = match state.cache.get_value_or_guard_async(&image_id).await {
        Ok(bytes) => bytes,
        Err(guard) => {
            let image = Image::get_image(&state.db, image_id)?.ok_or(WebError::NotFound)?;
            let bytes = Bytes::from(image.content_bytes);
            guard.insert(bytes.clone()).unwrap_or_default();
            bytes
        }
    };
    Ok(([(header::CONTENT_TYPE, "image/webp")], bytes))
}
