//! The JSON shapes returned to callers, with flags computed relative to whoever is asking.

use axum::http::Uri;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::ApiConfig;
use crate::errors::{WebError, WebResult};
use crate::media::image_url;
use crate::models::{Follow, Recipe, RecipeIngredient, RecipeLink, Tag, User};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct UserView {
    pub email: String,
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn build(conn: &Connection, user: User, viewer: Option<i64>) -> rusqlite::Result<Self> {
        let is_subscribed = match viewer {
            Some(viewer) => Follow::exists(conn, viewer, user.id)?,
            None => false,
        };
        Ok(Self {
            email: user.email,
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        })
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RecipeView {
    pub id: i64,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i64,
}

impl RecipeView {
    pub fn build(conn: &Connection, recipe: Recipe, viewer: Option<i64>) -> WebResult<Self> {
        let author = User::get_by_id(conn, recipe.author_id)?
            .ok_or_else(|| anyhow::anyhow!("Recipe {} has no author", recipe.id))?;
        let (is_favorited, is_in_shopping_cart) = list_flags(conn, recipe.id, viewer)?;
        Ok(Self {
            id: recipe.id,
            tags: recipe.get_tags(conn)?,
            author: UserView::build(conn, author, viewer)?,
            ingredients: recipe.get_ingredients(conn)?,
            is_favorited,
            is_in_shopping_cart,
            image: image_url(recipe.image_id),
            name: recipe.name,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        })
    }
}

/// Whether the viewer has favorited the recipe, and whether it is in their cart.
/// Anonymous viewers have neither.
fn list_flags(conn: &Connection, recipe_id: i64, viewer: Option<i64>) -> rusqlite::Result<(bool, bool)> {
    match viewer {
        Some(viewer) => Ok((
            RecipeLink::Favorite.contains(conn, viewer, recipe_id)?,
            RecipeLink::ShoppingCart.contains(conn, viewer, recipe_id)?,
        )),
        None => Ok((false, false)),
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ShortRecipe {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub cooking_time: i64,
}

impl From<Recipe> for ShortRecipe {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: image_url(recipe.image_id),
            cooking_time: recipe.cooking_time,
        }
    }
}

/// An author someone follows, with a preview of their latest recipes.
#[derive(Debug, Serialize, Clone)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: i64,
}

impl SubscriptionView {
    pub fn build(
        conn: &Connection,
        author: User,
        viewer: Option<i64>,
        recipes_limit: Option<u32>,
    ) -> rusqlite::Result<Self> {
        let recipes = Recipe::list_by_author(conn, author.id, recipes_limit)?
            .into_iter()
            .map(ShortRecipe::from)
            .collect();
        let recipes_count = Recipe::count_by_author(conn, author.id)?;
        Ok(Self {
            user: UserView::build(conn, author, viewer)?,
            recipes,
            recipes_count,
        })
    }
}

/// Which slice of a listing the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, api: &ApiConfig) -> WebResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(WebError::validation("Page numbers start at 1"));
        }
        let limit = limit.unwrap_or(api.page_size);
        if limit == 0 {
            return Err(WebError::validation("Limit must be at least 1"));
        }
        Ok(Self {
            page,
            limit: limit.min(api.max_page_size.max(1)),
        })
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap one page of results. Asking for a page past the end is NotFound,
    /// except for the first page, which may be empty.
    pub fn new(count: i64, results: Vec<T>, request: PageRequest, uri: &Uri) -> WebResult<Self> {
        let offset = i64::from(request.offset());
        if request.page > 1 && offset >= count {
            return Err(WebError::NotFound);
        }
        let next = (offset + (results.len() as i64) < count)
            .then(|| page_link(uri, request.page + 1));
        let previous = (request.page > 1).then(|| page_link(uri, request.page - 1));
        Ok(Self {
            count,
            next,
            previous,
            results,
        })
    }
}

/// The same request, but for another page.
fn page_link(uri: &Uri, page: u32) -> String {
    let mut pairs = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some("page"))
        .map(str::to_string)
        .collect::<Vec<_>>();
    pairs.push(format!("page={}", page));
    format!("{}?{}", uri.path(), pairs.join("&"))
}
