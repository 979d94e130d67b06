//! The shopping list: every ingredient needed for the recipes in a user's cart, summed.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::database::{query_rows, FromRow};

pub const HEADER: &str = "shopping cart:";

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

impl FromRow for ShoppingListLine {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get("name")?,
            measurement_unit: row.get("measurement_unit")?,
            total_amount: row.get("total_amount")?,
        })
    }
}

/// Sum the ingredients of every recipe in the user's cart, grouped by name and unit.
pub fn aggregate(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<ShoppingListLine>> {
    query_rows(
        conn,
        "SELECT ingredients.name, ingredients.measurement_unit,
            SUM(recipe_ingredients.amount) AS total_amount
        FROM shopping_carts
        JOIN recipe_ingredients ON recipe_ingredients.recipe_id = shopping_carts.recipe_id
        JOIN ingredients ON ingredients.id = recipe_ingredients.ingredient_id
        WHERE shopping_carts.user_id = ?
        GROUP BY ingredients.name, ingredients.measurement_unit
        ORDER BY ingredients.name, ingredients.measurement_unit",
        params![user_id],
    )
}

/// Render the list as the downloadable text file.
pub fn render(lines: &[ShoppingListLine]) -> String {
    let mut out = format!("{}\n", HEADER);
    for line in lines {
        out.push_str(&format!(
            "{} - {}{}.\n",
            line.name, line.total_amount, line.measurement_unit
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::database::temporary;
    use crate::models::recipe::tests::{stock_kitchen, upload};
    use crate::models::{Recipe, RecipeLink};

    #[test]
    fn cart_of_one_recipe() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let recipe = Recipe::create(
            &db,
            k.alice.id,
            upload("Cake", &[k.dinner.id], &[(k.flour.id, 200), (k.sugar.id, 100)]),
            &ApiConfig::default(),
        )
        .unwrap();
        RecipeLink::ShoppingCart.add(&db, k.bob.id, recipe.id).unwrap();

        let conn = db.pool.get().unwrap();
        let report = render(&aggregate(&conn, k.bob.id).unwrap());
        assert_eq!(report, "shopping cart:\nflour - 200g.\nsugar - 100g.\n");
    }

    #[test]
    fn amounts_are_summed_across_recipes() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let limits = ApiConfig::default();
        let cake = Recipe::create(
            &db,
            k.alice.id,
            upload("Cake", &[k.dinner.id], &[(k.flour.id, 200), (k.eggs.id, 2)]),
            &limits,
        )
        .unwrap();
        let bread = Recipe::create(
            &db,
            k.bob.id,
            upload("Bread", &[k.dinner.id], &[(k.flour.id, 500)]),
            &limits,
        )
        .unwrap();
        let ignored = Recipe::create(
            &db,
            k.bob.id,
            upload("Meringue", &[k.dinner.id], &[(k.sugar.id, 300)]),
            &limits,
        )
        .unwrap();
        RecipeLink::ShoppingCart.add(&db, k.bob.id, cake.id).unwrap();
        RecipeLink::ShoppingCart.add(&db, k.bob.id, bread.id).unwrap();
        RecipeLink::ShoppingCart.add(&db, k.alice.id, ignored.id).unwrap();

        let conn = db.pool.get().unwrap();
        let lines = aggregate(&conn, k.bob.id).unwrap();
        assert_eq!(
            lines,
            vec![
                ShoppingListLine {
                    name: "eggs".into(),
                    measurement_unit: "pcs".into(),
                    total_amount: 2
                },
                ShoppingListLine {
                    name: "flour".into(),
                    measurement_unit: "g".into(),
                    total_amount: 700
                },
            ]
        );
    }

    #[test]
    fn same_name_different_unit_stays_separate() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let flour_kg = {
            let conn = db.pool.get().unwrap();
            crate::models::Ingredient::create(&conn, "flour", "kg").unwrap()
        };
        let recipe = Recipe::create(
            &db,
            k.alice.id,
            upload("Big batch", &[k.dinner.id], &[(k.flour.id, 250), (flour_kg.id, 2)]),
            &ApiConfig::default(),
        )
        .unwrap();
        RecipeLink::ShoppingCart.add(&db, k.alice.id, recipe.id).unwrap();
        let conn = db.pool.get().unwrap();
        let report = render(&aggregate(&conn, k.alice.id).unwrap());
        assert_eq!(report, "shopping cart:\nflour - 250g.\nflour - 2kg.\n");
    }

    #[test]
    fn largest_amounts_still_add_up() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let limits = ApiConfig::default();
        for (author, name) in [(&k.alice, "Sack"), (&k.bob, "Silo")] {
            let recipe = Recipe::create(
                &db,
                author.id,
                upload(name, &[k.dinner.id], &[(k.flour.id, limits.ingredient_max_amount)]),
                &limits,
            )
            .unwrap();
            RecipeLink::ShoppingCart.add(&db, k.bob.id, recipe.id).unwrap();
        }
        let conn = db.pool.get().unwrap();
        let report = render(&aggregate(&conn, k.bob.id).unwrap());
        assert_eq!(report, "shopping cart:\nflour - 65534g.\n");
    }

    #[test]
    fn empty_cart_is_just_the_header() {
        let (_dir, db) = temporary();
        let k = stock_kitchen(&db);
        let conn = db.pool.get().unwrap();
        assert!(aggregate(&conn, k.alice.id).unwrap().is_empty());
        assert_eq!(render(&[]), "shopping cart:\n");
    }
}
