mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod routes {
    pub mod ingredients;
    pub mod recipes;
    pub mod tags;
    pub mod users;
}
pub mod config;
mod constants;
pub mod server;
pub mod shopping_list;

pub use authentication::*;
pub use constants::*;
pub use database::*;
pub use server::{app, start_server};
