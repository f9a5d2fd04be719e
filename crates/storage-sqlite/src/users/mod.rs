//! SQLite persistence for user records.

mod model;
mod repository;

pub use model::UserDB;
pub use repository::UserRepository;
