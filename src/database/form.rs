use std::{collections::HashSet, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{
    error::{Error, HtmlError, TypeError},
    schema::Id,
};
use crate::constants::{
    RECIPE_NAME_MAX_LENGTH, RECIPE_TEXT_MAX_LENGTH, USERNAME_MAX_LENGTH, USER_NAME_MAX_LENGTH,
};

/// Raw `key=value` pairs of a query string. Keys may repeat.
pub type FormData = Vec<(String, String)>;

pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr,
    {
        match self.first(key) {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| TypeError::new(&format!("Invalid number for '{key}'"))),
            None => Ok(None),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.first(key).map(|v| v.to_string())
    }

    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.inner
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.to_owned())
            .collect()
    }

    /// `1`/`true` switch a flag on, `0`/`false` or absence leave it off.
    pub fn get_flag(&self, key: &str) -> Result<bool, TypeError> {
        match self.first(key) {
            Some("1") | Some("true") => Ok(true),
            Some("0") | Some("false") | None => Ok(false),
            Some(_) => Err(TypeError::new(&format!("Invalid flag for '{key}'"))),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Payload for creating a recipe or replacing one wholesale.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RecipeForm {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Id>,
    pub image: String,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeForm {
    pub fn validate(&self) -> Result<(), Error> {
        if self.ingredients.is_empty() {
            return Err(HtmlError::InvalidRequest.new("A recipe needs at least one ingredient"));
        }

        let mut seen = HashSet::with_capacity(self.ingredients.len());
        for line in &self.ingredients {
            if line.amount < 0 {
                return Err(HtmlError::InvalidRequest.new("Ingredient amount can't be negative"));
            }
            if !seen.insert(line.id) {
                return Err(HtmlError::InvalidRequest.new("Duplicate ingredient in recipe"));
            }
        }

        let mut seen = HashSet::with_capacity(self.tags.len());
        if self.tags.iter().any(|tag| !seen.insert(*tag)) {
            return Err(HtmlError::InvalidRequest.new("Duplicate tag in recipe"));
        }

        if self.cooking_time <= 0 {
            return Err(HtmlError::InvalidRequest.new("Cooking time must be at least one minute"));
        }

        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > RECIPE_NAME_MAX_LENGTH {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "Recipe name must be 1-{RECIPE_NAME_MAX_LENGTH} characters"
            )));
        }
        if self.text.chars().count() > RECIPE_TEXT_MAX_LENGTH {
            return Err(HtmlError::InvalidRequest.new(&format!(
                "Recipe text can't exceed {RECIPE_TEXT_MAX_LENGTH} characters"
            )));
        }
        if self.image.trim().is_empty() {
            return Err(HtmlError::InvalidRequest.new("Recipe image is required"));
        }

        Ok(())
    }

    pub fn ingredient_ids(&self) -> Vec<Id> {
        self.ingredients.iter().map(|line| line.id).collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), Error> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(HtmlError::InvalidRequest.new("Enter a valid email address"));
        }

        let username = self.username.trim();
        if username.is_empty()
            || username.chars().count() > USERNAME_MAX_LENGTH
            || !username
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            return Err(HtmlError::InvalidRequest.new("Enter a valid username"));
        }

        for name in [&self.first_name, &self.last_name] {
            if name.trim().is_empty() || name.chars().count() > USER_NAME_MAX_LENGTH {
                return Err(HtmlError::InvalidRequest.new(&format!(
                    "Names must be 1-{USER_NAME_MAX_LENGTH} characters"
                )));
            }
        }

        if self.password.is_empty() {
            return Err(HtmlError::InvalidRequest.new("Password is required"));
        }

        Ok(())
    }
}
