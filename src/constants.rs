pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const RECIPE_TEXT_MAX_LENGTH: usize = 500;

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const USER_NAME_MAX_LENGTH: usize = 150;

/// Upper bound for JSON request bodies; recipe images travel inline.
pub const BODY_SIZE_LIMIT: u64 = 8 * 1024 * 1024;

pub const SESSION_LIFETIME_HOURS: i64 = 24;

pub const SHOPPING_LIST_SUFFIX: &str = "_shopping_list.csv";
