//! Reference data: ingredients and tags.
//!
//! Both are curated outside the API, so the only writes here are the
//! constructors used to seed them.

use anyhow::Result;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::check_name;
use crate::database::{query_rows, Database, FromRow};
use crate::errors::{WebError, WebResult};

lazy_static::lazy_static! {
    static ref COLOR: Regex = Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("Failed to build color pattern");
    static ref SLUG: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Failed to build slug pattern");
}

pub const DEFAULT_TAG_COLOR: &str = "#FF0000";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

impl FromRow for Ingredient {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            measurement_unit: row.get("measurement_unit")?,
        })
    }
}

impl Ingredient {
    /// Add an ingredient. The (name, unit) pair must be new.
    pub fn create(conn: &Connection, name: &str, measurement_unit: &str) -> WebResult<Self> {
        check_name("Ingredient name", name)?;
        check_name("Measurement unit", measurement_unit)?;
        conn.execute(
            "INSERT INTO ingredients (name, name_folded, measurement_unit) VALUES (?, ?, ?)",
            params![name, name.to_lowercase(), measurement_unit],
        )?;
        Ok(Self {
            id: conn.last_insert_rowid(),
            name: name.into(),
            measurement_unit: measurement_unit.into(),
        })
    }

    /// List ingredients by name, optionally only those whose name starts with `prefix`.
    ///
    /// Matching ignores case for any script, using the lowercased name stored alongside.
    pub fn search(db: &Database, prefix: Option<&str>) -> Result<Vec<Self>> {
        match prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => {
                let folded = prefix.to_lowercase();
                db.collect_rows(
                    "SELECT * FROM ingredients
                    WHERE substr(name_folded, 1, length(?1)) = ?1
                    ORDER BY name, measurement_unit",
                    params![folded],
                )
            }
            None => db.collect_rows(
                "SELECT * FROM ingredients ORDER BY name, measurement_unit",
                params![],
            ),
        }
    }

    pub fn get_by_id(db: &Database, ingredient_id: i64) -> Result<Option<Self>> {
        Ok(db
            .collect_rows(
                "SELECT * FROM ingredients WHERE id = ?",
                params![ingredient_id],
            )?
            .pop())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl FromRow for Tag {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            color: row.get("color")?,
            slug: row.get("slug")?,
        })
    }
}

impl Tag {
    /// Add a tag. Name and slug must both be unused.
    pub fn create(conn: &Connection, name: &str, color: Option<&str>, slug: &str) -> WebResult<Self> {
        check_name("Tag name", name)?;
        let color = color.unwrap_or(DEFAULT_TAG_COLOR);
        if !COLOR.is_match(color) {
            return Err(WebError::validation(format!(
                "Tag color must look like #RRGGBB, got {:?}",
                color
            )));
        }
        if slug.len() > super::MAX_NAME_LEN || !SLUG.is_match(slug) {
            return Err(WebError::validation(format!(
                "Tag slug may only contain letters, digits, '-' and '_', got {:?}",
                slug
            )));
        }
        conn.execute(
            "INSERT INTO tags (name, color, slug) VALUES (?, ?, ?)",
            params![name, color, slug],
        )?;
        Ok(Self {
            id: conn.last_insert_rowid(),
            name: name.into(),
            color: color.into(),
            slug: slug.into(),
        })
    }

    pub fn list_all(db: &Database) -> Result<Vec<Self>> {
        db.collect_rows("SELECT * FROM tags ORDER BY name", params![])
    }

    pub fn get_by_id(db: &Database, tag_id: i64) -> Result<Option<Self>> {
        Ok(db
            .collect_rows("SELECT * FROM tags WHERE id = ?", params![tag_id])?
            .pop())
    }

    pub fn exists(conn: &Connection, tag_id: i64) -> rusqlite::Result<bool> {
        Ok(conn
            .query_row("SELECT 1 FROM tags WHERE id = ?", params![tag_id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// All the tags on a recipe
    pub fn for_recipe(conn: &Connection, recipe_id: i64) -> rusqlite::Result<Vec<Self>> {
        query_rows(
            conn,
            "SELECT tags.* FROM tags
            JOIN recipe_tags ON recipe_tags.tag_id = tags.id
            WHERE recipe_tags.recipe_id = ?
            ORDER BY tags.name",
            params![recipe_id],
        )
    }
}
