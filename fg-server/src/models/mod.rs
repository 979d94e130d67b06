pub mod catalog;
pub mod recipe;
pub mod relations;
pub mod user;

pub use catalog::{Ingredient, Tag};
pub use recipe::{Recipe, RecipeFilter, RecipeIngredient, RecipeUpdate};
pub use relations::RecipeLink;
pub use user::{Follow, NewUser, User};

pub fn sqlite_current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Longest name accepted for ingredients, tags and recipes.
pub const MAX_NAME_LEN: usize = 200;

/// Check that a required text field is present and not too long.
pub(crate) fn check_name(field: &str, value: &str) -> crate::errors::WebResult<()> {
    if value.trim().is_empty() {
        return Err(crate::errors::WebError::validation(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(crate::errors::WebError::validation(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(())
}
