mod courses;
pub mod db;
pub mod models;
pub mod store;
mod tables;
mod users;

pub use db::{Database, DatabaseError};
pub use store::{Store, StoreError};
pub use tables::*;
