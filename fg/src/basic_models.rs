use serde::{Deserialize, Serialize};

/// A new recipe, as posted by its author.
///
/// `image` is base64, optionally wrapped in a `data:<mime>;base64,` URL.
#[derive(Deserialize, Serialize, Clone)]
pub struct RecipeForWrite {
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i64,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
}

impl std::fmt::Debug for RecipeForWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeForWrite")
            .field("name", &self.name)
            .field("cooking_time", &self.cooking_time)
            .field("image", &self.image.len())
            .field("tags", &self.tags)
            .field("ingredients", &self.ingredients)
            .finish()
    }
}

/// A partial update to a recipe.
///
/// Missing scalar fields keep their stored value, but the tag and ingredient
/// sets are always replaced wholesale.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct RecipePatch {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i64>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
}

impl std::fmt::Debug for RecipePatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipePatch")
            .field("name", &self.name)
            .field("cooking_time", &self.cooking_time)
            .field("image", &self.image.as_ref().map(String::len))
            .field("tags", &self.tags)
            .field("ingredients", &self.ingredients)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: i64,
    pub amount: i64,
}

impl From<RecipeForWrite> for RecipePatch {
    fn from(recipe: RecipeForWrite) -> Self {
        Self {
            name: Some(recipe.name),
            text: Some(recipe.text),
            image: Some(recipe.image),
            cooking_time: Some(recipe.cooking_time),
            tags: recipe.tags,
            ingredients: recipe.ingredients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_without_sets_deserializes_to_empty_sets() {
        let patch: RecipePatch = serde_json::from_str(r#"{"name": "Soup"}"#).unwrap();
        assert_eq!(patch.name.as_deref(), Some("Soup"));
        assert!(patch.tags.is_empty());
        assert!(patch.ingredients.is_empty());
        assert!(patch.image.is_none());
    }

    #[test]
    fn debug_hides_image_payload() {
        let recipe = RecipeForWrite {
            name: "Bread".into(),
            text: "Bake it".into(),
            image: "data:image/png;base64,AAAA".into(),
            cooking_time: 40,
            tags: vec![1],
            ingredients: vec![IngredientAmount { id: 3, amount: 500 }],
        };
        let debug = format!("{:?}", recipe);
        assert!(debug.contains("Bread"));
        assert!(!debug.contains("base64"));
    }
}
