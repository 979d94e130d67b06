use rusqlite::{params, Connection};

use super::recipe::Recipe;
use crate::database::{exists, Database};
use crate::errors::{WebError, WebResult};

/// The per-user lists a recipe can be put on. Both work the same way, so they share a table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum RecipeLink {
    #[strum(serialize = "favorites")]
    Favorite,
    #[strum(serialize = "shopping_carts")]
    ShoppingCart,
}

impl RecipeLink {
    fn table(self) -> &'static str {
        self.into()
    }

    fn describe(self) -> &'static str {
        match self {
            RecipeLink::Favorite => "favorites",
            RecipeLink::ShoppingCart => "shopping cart",
        }
    }

    /// Put a recipe on the user's list, returning the recipe.
    pub fn add(self, db: &Database, user_id: i64, recipe_id: i64) -> WebResult<Recipe> {
        let recipe = db.transaction(|tx| {
            let recipe = Recipe::get_by_id(tx, recipe_id)?.ok_or(WebError::NotFound)?;
            if self.contains(tx, user_id, recipe_id)? {
                return Err(WebError::conflict(format!(
                    "Recipe is already in your {}",
                    self.describe()
                )));
            }
            tx.execute(
                &format!("INSERT INTO {} (user_id, recipe_id) VALUES (?, ?)", self.table()),
                params![user_id, recipe_id],
            )?;
            Ok(recipe)
        })?;
        tracing::info!(user_id, recipe_id, list = self.table(), "Added recipe to list");
        Ok(recipe)
    }

    pub fn remove(self, db: &Database, user_id: i64, recipe_id: i64) -> WebResult<()> {
        let conn = db.pool.get()?;
        if Recipe::get_by_id(&conn, recipe_id)?.is_none() {
            return Err(WebError::NotFound);
        }
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE user_id = ? AND recipe_id = ?", self.table()),
            params![user_id, recipe_id],
        )?;
        if removed == 0 {
            return Err(WebError::NotFound);
        }
        tracing::info!(user_id, recipe_id, list = self.table(), "Removed recipe from list");
        Ok(())
    }

    pub fn contains(self, conn: &Connection, user_id: i64, recipe_id: i64) -> rusqlite::Result<bool> {
        exists(
            conn,
            &format!("SELECT 1 FROM {} WHERE user_id = ? AND recipe_id = ?", self.table()),
            params![user_id, recipe_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::database::temporary;
    use crate::models::recipe::tests::{stock_kitchen, upload};

    #[test]
    fn lists_are_independent_toggles() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let recipe = Recipe::create(
            &db,
            k.alice.id,
            upload("Brownies", &[k.dinner.id], &[(k.sugar.id, 100)]),
            &ApiConfig::default(),
        )
        .unwrap();

        let added = RecipeLink::Favorite.add(&db, k.bob.id, recipe.id).unwrap();
        assert_eq!(added.id, recipe.id);
        assert!(matches!(
            RecipeLink::Favorite.add(&db, k.bob.id, recipe.id),
            Err(WebError::Conflict(_))
        ));
        {
            let conn = db.pool.get().unwrap();
            assert!(RecipeLink::Favorite.contains(&conn, k.bob.id, recipe.id).unwrap());
            assert!(!RecipeLink::ShoppingCart.contains(&conn, k.bob.id, recipe.id).unwrap());
            assert!(!RecipeLink::Favorite.contains(&conn, k.alice.id, recipe.id).unwrap());
        }
        RecipeLink::ShoppingCart.add(&db, k.bob.id, recipe.id).unwrap();
        RecipeLink::Favorite.remove(&db, k.bob.id, recipe.id).unwrap();
        assert!(matches!(
            RecipeLink::Favorite.remove(&db, k.bob.id, recipe.id),
            Err(WebError::NotFound)
        ));
        let conn = db.pool.get().unwrap();
        assert!(RecipeLink::ShoppingCart.contains(&conn, k.bob.id, recipe.id).unwrap());
    }

    #[test]
    fn missing_recipe_is_not_found() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        for link in [RecipeLink::Favorite, RecipeLink::ShoppingCart] {
            assert!(matches!(link.add(&db, k.bob.id, 404), Err(WebError::NotFound)));
            assert!(matches!(link.remove(&db, k.bob.id, 404), Err(WebError::NotFound)));
        }
    }

    #[test]
    fn recipe_deleted_before_insert_is_not_found() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let recipe = Recipe::create(
            &db,
            k.alice.id,
            upload("Fleeting", &[k.dinner.id], &[(k.eggs.id, 1)]),
            &ApiConfig::default(),
        )
        .unwrap();
        Recipe::delete(&db, k.alice.id, recipe.id).unwrap();
        // The insert a racing add would issue after its existence check passed
        let conn = db.pool.get().unwrap();
        let err: WebError = conn
            .execute(
                "INSERT INTO favorites (user_id, recipe_id) VALUES (?, ?)",
                params![k.bob.id, recipe.id],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, WebError::NotFound), "{:?}", err);
    }
}
