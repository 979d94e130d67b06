use regex::Regex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::recipe::Recipe;
use super::{sqlite_current_timestamp, MAX_NAME_LEN};
use crate::database::{exists, query_rows, Database, FromRow};
use crate::errors::{WebError, WebResult};

lazy_static::lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Failed to build email pattern");
    static ref USERNAME: Regex = Regex::new(r"^[\w.@+-]+$").expect("Failed to build username pattern");
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl FromRow for User {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            username: row.get("username")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
        })
    }
}

/// Account details for a user registered by the identity provider.
#[derive(Debug, Deserialize, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub fn create(conn: &Connection, new: &NewUser) -> WebResult<Self> {
        if new.email.len() > 254 || !EMAIL.is_match(&new.email) {
            return Err(WebError::validation(format!("Invalid email {:?}", new.email)));
        }
        if new.username.chars().count() > 150 || !USERNAME.is_match(&new.username) {
            return Err(WebError::validation(format!(
                "Invalid username {:?}",
                new.username
            )));
        }
        for (field, value) in [("First name", &new.first_name), ("Last name", &new.last_name)] {
            if value.trim().is_empty() || value.chars().count() > MAX_NAME_LEN {
                return Err(WebError::validation(format!("{} is required", field)));
            }
        }
        conn.execute(
            "INSERT INTO users (email, username, first_name, last_name, created_on)
            VALUES (?, ?, ?, ?, ?)",
            params![
                new.email,
                new.username,
                new.first_name,
                new.last_name,
                sqlite_current_timestamp()
            ],
        )?;
        Ok(Self {
            id: conn.last_insert_rowid(),
            email: new.email.clone(),
            username: new.username.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
        })
    }

    pub fn get_by_id(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<Self>> {
        Ok(query_rows(conn, "SELECT * FROM users WHERE id = ?", params![user_id])?.pop())
    }

    /// One page of users, newest first, along with the total count.
    pub fn list_page(conn: &Connection, offset: u32, limit: u32) -> rusqlite::Result<(i64, Vec<Self>)> {
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let users = query_rows(
            conn,
            "SELECT * FROM users ORDER BY id DESC LIMIT ? OFFSET ?",
            params![limit, offset],
        )?;
        Ok((count, users))
    }

    /// Remove a user and everything hanging off them, including the recipes they wrote.
    pub fn delete(db: &Database, user_id: i64) -> WebResult<Vec<i64>> {
        db.transaction(|tx| {
            if Self::get_by_id(tx, user_id)?.is_none() {
                return Err(WebError::NotFound);
            }
            let recipe_ids: Vec<i64> = tx
                .prepare("SELECT id FROM recipes WHERE author_id = ?")?
                .query_map(params![user_id], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            let mut image_ids = Vec::with_capacity(recipe_ids.len());
            for recipe_id in recipe_ids {
                if let Some(image_id) = Recipe::delete_cascade(tx, recipe_id)? {
                    image_ids.push(image_id);
                }
            }
            tx.execute("DELETE FROM favorites WHERE user_id = ?", params![user_id])?;
            tx.execute("DELETE FROM shopping_carts WHERE user_id = ?", params![user_id])?;
            tx.execute(
                "DELETE FROM follows WHERE follower_id = ? OR following_id = ?",
                params![user_id, user_id],
            )?;
            tx.execute("DELETE FROM auth_tokens WHERE user_id = ?", params![user_id])?;
            tx.execute("DELETE FROM users WHERE id = ?", params![user_id])?;
            tracing::info!(user_id, "Deleted user");
            Ok(image_ids)
        })
    }
}

/// A subscription from one user to another author's recipes.
pub struct Follow;

impl Follow {
    /// Subscribe `follower_id` to `following_id`.
    pub fn add(db: &Database, follower_id: i64, following_id: i64) -> WebResult<()> {
        if follower_id == following_id {
            return Err(WebError::validation("You cannot subscribe to yourself"));
        }
        db.transaction(|tx| {
            if User::get_by_id(tx, following_id)?.is_none() {
                return Err(WebError::NotFound);
            }
            // Advisory only: a concurrent duplicate still trips the unique constraint
            if Self::exists(tx, follower_id, following_id)? {
                return Err(WebError::conflict("You are already subscribed to this user"));
            }
            tx.execute(
                "INSERT INTO follows (follower_id, following_id) VALUES (?, ?)",
                params![follower_id, following_id],
            )?;
            Ok(())
        })?;
        tracing::info!(follower_id, following_id, "Subscribed");
        Ok(())
    }

    pub fn remove(db: &Database, follower_id: i64, following_id: i64) -> WebResult<()> {
        let conn = db.pool.get()?;
        if User::get_by_id(&conn, following_id)?.is_none() {
            return Err(WebError::NotFound);
        }
        let removed = conn.execute(
            "DELETE FROM follows WHERE follower_id = ? AND following_id = ?",
            params![follower_id, following_id],
        )?;
        if removed == 0 {
            return Err(WebError::NotFound);
        }
        tracing::info!(follower_id, following_id, "Unsubscribed");
        Ok(())
    }

    pub fn exists(conn: &Connection, follower_id: i64, following_id: i64) -> rusqlite::Result<bool> {
        exists(
            conn,
            "SELECT 1 FROM follows WHERE follower_id = ? AND following_id = ?",
            params![follower_id, following_id],
        )
    }

    /// The authors `follower_id` is subscribed to, most recent subscription first.
    pub fn following_page(
        conn: &Connection,
        follower_id: i64,
        offset: u32,
        limit: u32,
    ) -> rusqlite::Result<(i64, Vec<User>)> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?",
            params![follower_id],
            |row| row.get(0),
        )?;
        let users = query_rows(
            conn,
            "SELECT users.* FROM users
            JOIN follows ON follows.following_id = users.id
            WHERE follows.follower_id = ?
            ORDER BY follows.id DESC
            LIMIT ? OFFSET ?",
            params![follower_id, limit, offset],
        )?;
        Ok((count, users))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::temporary;

    pub(crate) fn new_user(name: &str) -> NewUser {
        NewUser {
            email: format!("{}@example.com", name),
            username: name.into(),
            first_name: name.into(),
            last_name: "Tester".into(),
        }
    }

    #[test]
    fn user_fields_are_validated() {
        let (_dir, db) = temporary();
        let conn = db.pool.get().unwrap();
        let mut bad = new_user("alice");
        bad.email = "not-an-email".into();
        assert!(matches!(User::create(&conn, &bad), Err(WebError::Validation(_))));
        let mut bad = new_user("alice");
        bad.username = "has space".into();
        assert!(matches!(User::create(&conn, &bad), Err(WebError::Validation(_))));
        let mut bad = new_user("alice");
        bad.first_name = "".into();
        assert!(matches!(User::create(&conn, &bad), Err(WebError::Validation(_))));

        User::create(&conn, &new_user("alice")).unwrap();
        let mut dup = new_user("alice");
        dup.email = "other@example.com".into();
        assert!(matches!(User::create(&conn, &dup), Err(WebError::Conflict(_))));
    }

    #[test]
    fn self_follow_always_fails() {
        let (_dir, db) = temporary();
        let (alice, bob) = {
            let conn = db.pool.get().unwrap();
            (
                User::create(&conn, &new_user("alice")).unwrap(),
                User::create(&conn, &new_user("bob")).unwrap(),
            )
        };
        assert!(matches!(
            Follow::add(&db, alice.id, alice.id),
            Err(WebError::Validation(_))
        ));
        Follow::add(&db, alice.id, bob.id).unwrap();
        Follow::add(&db, bob.id, alice.id).unwrap();
        assert!(matches!(
            Follow::add(&db, alice.id, alice.id),
            Err(WebError::Validation(_))
        ));
        // The store rejects it too, even if the application check is bypassed
        let conn = db.pool.get().unwrap();
        let err: WebError = conn
            .execute(
                "INSERT INTO follows (follower_id, following_id) VALUES (?, ?)",
                params![alice.id, alice.id],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, WebError::Validation(_)));
    }

    #[test]
    fn follow_toggle() {
        let (_dir, db) = temporary();
        let (alice, bob) = {
            let conn = db.pool.get().unwrap();
            (
                User::create(&conn, &new_user("alice")).unwrap(),
                User::create(&conn, &new_user("bob")).unwrap(),
            )
        };
        Follow::add(&db, alice.id, bob.id).unwrap();
        assert!(matches!(
            Follow::add(&db, alice.id, bob.id),
            Err(WebError::Conflict(_))
        ));
        assert!(matches!(Follow::add(&db, alice.id, 999), Err(WebError::NotFound)));
        {
            let conn = db.pool.get().unwrap();
            assert!(Follow::exists(&conn, alice.id, bob.id).unwrap());
            assert!(!Follow::exists(&conn, bob.id, alice.id).unwrap());
            let (count, users) = Follow::following_page(&conn, alice.id, 0, 10).unwrap();
            assert_eq!(count, 1);
            assert_eq!(users, vec![bob.clone()]);
        }
        Follow::remove(&db, alice.id, bob.id).unwrap();
        assert!(matches!(
            Follow::remove(&db, alice.id, bob.id),
            Err(WebError::NotFound)
        ));
    }

    #[test]
    fn users_are_listed_newest_first() {
        let (_dir, db) = temporary();
        let conn = db.pool.get().unwrap();
        for name in ["a", "b", "c"] {
            User::create(&conn, &new_user(name)).unwrap();
        }
        let (count, users) = User::list_page(&conn, 1, 1).unwrap();
        assert_eq!(count, 3);
        assert_eq!(users[0].username, "b");
    }
}
