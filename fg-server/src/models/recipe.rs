use std::collections::HashSet;

use fg::basic_models::{IngredientAmount, RecipeForWrite, RecipePatch};
use itertools::Itertools;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::catalog::Tag;
use super::{check_name, sqlite_current_timestamp};
use crate::config::ApiConfig;
use crate::database::{query_rows, Database, FromRow};
use crate::errors::{WebError, WebResult};
use crate::media::{self, Image};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub id: i64,
    pub author_id: i64,
    pub name: String,
    pub text: String,
    pub image_id: i64,
    pub cooking_time: i64,
    pub created_on: String,
}

impl FromRow for Recipe {
    /// Create a new recipe from an sql row, provided by rusqlite, using named columns.
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            name: row.get("name")?,
            text: row.get("text")?,
            image_id: row.get("image_id")?,
            cooking_time: row.get("cooking_time")?,
            created_on: row.get("created_on")?,
        })
    }
}

/// How much of one ingredient a recipe calls for, with the ingredient's details inlined.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecipeIngredient {
    /// The ingredient's id, not the join row's
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl FromRow for RecipeIngredient {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("ingredient_id")?,
            name: row.get("name")?,
            measurement_unit: row.get("measurement_unit")?,
            amount: row.get("amount")?,
        })
    }
}

/// Narrowing applied when listing recipes.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches if it has any of them
    pub tags: Vec<String>,
    pub author: Option<i64>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// The result of an update: the stored recipe, and the image it replaced, if any.
#[derive(Debug)]
pub struct RecipeUpdate {
    pub recipe: Recipe,
    pub replaced_image: Option<i64>,
}

impl Recipe {
    pub fn get_by_id(conn: &Connection, recipe_id: i64) -> rusqlite::Result<Option<Self>> {
        Ok(query_rows(conn, "SELECT * FROM recipes WHERE id = ?", params![recipe_id])?.pop())
    }

    /// List all the tags for a recipe
    pub fn get_tags(&self, conn: &Connection) -> rusqlite::Result<Vec<Tag>> {
        Tag::for_recipe(conn, self.id)
    }

    /// List the ingredients and amounts for a recipe, in the order they were added
    pub fn get_ingredients(&self, conn: &Connection) -> rusqlite::Result<Vec<RecipeIngredient>> {
        query_rows(
            conn,
            "SELECT recipe_ingredients.ingredient_id, recipe_ingredients.amount,
                ingredients.name, ingredients.measurement_unit
            FROM recipe_ingredients
            JOIN ingredients ON ingredients.id = recipe_ingredients.ingredient_id
            WHERE recipe_ingredients.recipe_id = ?
            ORDER BY recipe_ingredients.id",
            params![self.id],
        )
    }

    /// One page of recipes matching `filter`, newest first, along with the total count.
    ///
    /// `viewer` is whoever is asking; the favorite and cart filters are relative to them,
    /// and match nothing for an anonymous viewer.
    pub fn list_page(
        conn: &Connection,
        filter: &RecipeFilter,
        viewer: Option<i64>,
        offset: u32,
        limit: u32,
    ) -> rusqlite::Result<(i64, Vec<Self>)> {
        let mut clauses: Vec<String> = vec![];
        let mut values: Vec<Value> = vec![];
        if !filter.tags.is_empty() {
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM recipe_tags
                    JOIN tags ON tags.id = recipe_tags.tag_id
                    WHERE recipe_tags.recipe_id = recipes.id AND tags.slug IN ({}))",
                filter.tags.iter().map(|_| "?").join(", ")
            ));
            values.extend(filter.tags.iter().cloned().map(Value::Text));
        }
        if let Some(author) = filter.author {
            clauses.push("recipes.author_id = ?".into());
            values.push(Value::Integer(author));
        }
        for (enabled, table) in [
            (filter.is_favorited, "favorites"),
            (filter.is_in_shopping_cart, "shopping_carts"),
        ] {
            if !enabled {
                continue;
            }
            let Some(viewer) = viewer else {
                return Ok((0, vec![]));
            };
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM {table}
                    WHERE {table}.recipe_id = recipes.id AND {table}.user_id = ?)"
            ));
            values.push(Value::Integer(viewer));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM recipes {}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        values.push(Value::Integer(limit.into()));
        values.push(Value::Integer(offset.into()));
        let recipes = query_rows(
            conn,
            &format!(
                "SELECT * FROM recipes {} ORDER BY recipes.id DESC LIMIT ? OFFSET ?",
                where_clause
            ),
            params_from_iter(values.iter()),
        )?;
        Ok((count, recipes))
    }

    /// The newest recipes by an author, at most `limit` of them if given.
    pub fn list_by_author(
        conn: &Connection,
        author_id: i64,
        limit: Option<u32>,
    ) -> rusqlite::Result<Vec<Self>> {
        // SQLite treats a negative limit as no limit
        let limit = limit.map(i64::from).unwrap_or(-1);
        query_rows(
            conn,
            "SELECT * FROM recipes WHERE author_id = ? ORDER BY id DESC LIMIT ?",
            params![author_id, limit],
        )
    }

    pub fn count_by_author(conn: &Connection, author_id: i64) -> rusqlite::Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM recipes WHERE author_id = ?",
            params![author_id],
            |row| row.get(0),
        )
    }

    /// Publish a new recipe by `author_id`.
    ///
    /// The recipe, its image, its tags and its ingredients are written in one
    /// transaction, so any failure leaves nothing behind.
    pub fn create(
        db: &Database,
        author_id: i64,
        upload: RecipeForWrite,
        limits: &ApiConfig,
    ) -> WebResult<Self> {
        check_fields(&upload.name, &upload.text, upload.cooking_time, limits)?;
        check_sets(&upload.tags, &upload.ingredients, limits)?;
        let image = media::decode_upload(&upload.image, limits.max_image_bytes)?;

        let recipe_id = db.transaction(|tx| {
            let image_id = Image::insert(tx, &image)?;
            tx.execute(
                "INSERT INTO recipes (author_id, name, text, image_id, cooking_time, created_on)
                VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    author_id,
                    upload.name,
                    upload.text,
                    image_id,
                    upload.cooking_time,
                    sqlite_current_timestamp()
                ],
            )?;
            let recipe_id = tx.last_insert_rowid();
            replace_tags(tx, recipe_id, &upload.tags)?;
            replace_ingredients(tx, recipe_id, &upload.ingredients)?;
            Ok(recipe_id)
        })?;
        tracing::info!(recipe_id, author_id, "Created recipe");

        let conn = db.pool.get()?;
        Self::get_by_id(&conn, recipe_id)?.ok_or(WebError::NotFound)
    }

    /// Apply an author's changes to their recipe.
    ///
    /// Scalar fields missing from the patch are kept. The tag and ingredient sets are
    /// cleared and recreated from the patch, never merged.
    pub fn update(
        db: &Database,
        actor_id: i64,
        recipe_id: i64,
        patch: RecipePatch,
        limits: &ApiConfig,
    ) -> WebResult<RecipeUpdate> {
        let existing = {
            let conn = db.pool.get()?;
            Self::get_by_id(&conn, recipe_id)?.ok_or(WebError::NotFound)?
        };
        if existing.author_id != actor_id {
            return Err(WebError::PermissionDenied);
        }
        check_fields(
            patch.name.as_deref().unwrap_or(&existing.name),
            patch.text.as_deref().unwrap_or(&existing.text),
            patch.cooking_time.unwrap_or(existing.cooking_time),
            limits,
        )?;
        check_sets(&patch.tags, &patch.ingredients, limits)?;
        let image = patch
            .image
            .as_deref()
            .map(|payload| media::decode_upload(payload, limits.max_image_bytes))
            .transpose()?;

        let update = db.transaction(|tx| {
            // Check again under the write lock, in case it changed hands or vanished
            let current = Self::get_by_id(tx, recipe_id)?.ok_or(WebError::NotFound)?;
            if current.author_id != actor_id {
                return Err(WebError::PermissionDenied);
            }
            let new_image_id = image
                .as_deref()
                .map(|bytes| Image::insert(tx, bytes))
                .transpose()?;
            tx.execute(
                "UPDATE recipes SET
                    name = COALESCE(?, name),
                    text = COALESCE(?, text),
                    cooking_time = COALESCE(?, cooking_time),
                    image_id = COALESCE(?, image_id)
                WHERE id = ?",
                params![
                    patch.name,
                    patch.text,
                    patch.cooking_time,
                    new_image_id,
                    recipe_id
                ],
            )?;
            let replaced_image = match new_image_id {
                Some(_) => {
                    Image::delete(tx, current.image_id)?;
                    Some(current.image_id)
                }
                None => None,
            };
            replace_tags(tx, recipe_id, &patch.tags)?;
            replace_ingredients(tx, recipe_id, &patch.ingredients)?;
            let recipe = Self::get_by_id(tx, recipe_id)?.ok_or(WebError::NotFound)?;
            Ok(RecipeUpdate {
                recipe,
                replaced_image,
            })
        })?;
        tracing::info!(recipe_id, actor_id, "Updated recipe");
        Ok(update)
    }

    /// Delete an author's recipe along with everything that refers to it.
    ///
    /// Returns the id of the recipe's image, which is deleted too.
    pub fn delete(db: &Database, actor_id: i64, recipe_id: i64) -> WebResult<Option<i64>> {
        let image_id = db.transaction(|tx| {
            let recipe = Self::get_by_id(tx, recipe_id)?.ok_or(WebError::NotFound)?;
            if recipe.author_id != actor_id {
                return Err(WebError::PermissionDenied);
            }
            Ok(Self::delete_cascade(tx, recipe_id)?)
        })?;
        tracing::info!(recipe_id, actor_id, "Deleted recipe");
        Ok(image_id)
    }

    /// Remove a recipe and its dependent rows. Must run inside a transaction.
    pub(crate) fn delete_cascade(conn: &Connection, recipe_id: i64) -> rusqlite::Result<Option<i64>> {
        let image_id: Option<i64> = conn
            .query_row(
                "SELECT image_id FROM recipes WHERE id = ?",
                params![recipe_id],
                |row| row.get(0),
            )
            .optional()?;
        for table in ["recipe_tags", "recipe_ingredients", "favorites", "shopping_carts"] {
            conn.execute(
                &format!("DELETE FROM {} WHERE recipe_id = ?", table),
                params![recipe_id],
            )?;
        }
        conn.execute("DELETE FROM recipes WHERE id = ?", params![recipe_id])?;
        if let Some(image_id) = image_id {
            Image::delete(conn, image_id)?;
        }
        Ok(image_id)
    }
}

fn check_fields(name: &str, text: &str, cooking_time: i64, limits: &ApiConfig) -> WebResult<()> {
    check_name("Recipe name", name)?;
    if text.trim().is_empty() {
        return Err(WebError::validation("Recipe text must not be empty"));
    }
    if cooking_time < limits.cooking_time_min {
        return Err(WebError::validation(format!(
            "Cooking time must be at least {}",
            limits.cooking_time_min
        )));
    }
    if cooking_time > limits.cooking_time_max {
        return Err(WebError::validation(format!(
            "Cooking time must be at most {}",
            limits.cooking_time_max
        )));
    }
    Ok(())
}

/// Reject tag and ingredient lists that are empty or repeat themselves, and amounts out of range.
fn check_sets(tags: &[i64], ingredients: &[IngredientAmount], limits: &ApiConfig) -> WebResult<()> {
    if tags.is_empty() {
        return Err(WebError::validation("At least one tag is required"));
    }
    if tags.iter().collect::<HashSet<_>>().len() != tags.len() {
        return Err(WebError::validation("Tags must not repeat"));
    }
    if ingredients.is_empty() {
        return Err(WebError::validation("At least one ingredient is required"));
    }
    let min_amount = limits.ingredient_min_amount.max(1);
    if let Some(ingredient) = ingredients.iter().find(|i| i.amount < min_amount) {
        return Err(WebError::validation(format!(
            "Amount of ingredient {} must be at least {}",
            ingredient.id, min_amount
        )));
    }
    if let Some(ingredient) = ingredients
        .iter()
        .find(|i| i.amount > limits.ingredient_max_amount)
    {
        return Err(WebError::validation(format!(
            "Amount of ingredient {} must be at most {}",
            ingredient.id, limits.ingredient_max_amount
        )));
    }
    if ingredients.iter().map(|i| i.id).collect::<HashSet<_>>().len() != ingredients.len() {
        return Err(WebError::validation("Ingredients must not repeat"));
    }
    Ok(())
}

fn replace_tags(conn: &Connection, recipe_id: i64, tags: &[i64]) -> WebResult<()> {
    conn.execute("DELETE FROM recipe_tags WHERE recipe_id = ?", params![recipe_id])?;
    for &tag_id in tags {
        if !Tag::exists(conn, tag_id)? {
            return Err(WebError::validation(format!("Tag {} does not exist", tag_id)));
        }
        conn.execute(
            "INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)",
            params![recipe_id, tag_id],
        )?;
    }
    Ok(())
}

fn replace_ingredients(
    conn: &Connection,
    recipe_id: i64,
    ingredients: &[IngredientAmount],
) -> WebResult<()> {
    conn.execute(
        "DELETE FROM recipe_ingredients WHERE recipe_id = ?",
        params![recipe_id],
    )?;
    for ingredient in ingredients {
        let known = conn
            .query_row(
                "SELECT 1 FROM ingredients WHERE id = ?",
                params![ingredient.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !known {
            return Err(WebError::validation(format!(
                "Ingredient {} does not exist",
                ingredient.id
            )));
        }
        conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES (?, ?, ?)",
            params![recipe_id, ingredient.id, ingredient.amount],
        )?;
    }
    Ok(())
}
