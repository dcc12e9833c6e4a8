pub mod bookmarks;
pub mod follows;
pub mod ingredients;
pub mod recipes;
pub mod tags;
pub mod users;

pub use bookmarks::*;
pub use follows::*;
pub use ingredients::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
