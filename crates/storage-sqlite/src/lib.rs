//! SQLite adapters for the visit sync engine: the document store (user
//! records, watermark, run lease) and the relational session source.

pub mod db;
pub mod errors;
pub mod schema;
pub mod source;
pub mod sync;
pub mod users;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use source::SqlSessionSource;
pub use sync::WatermarkRepository;
pub use users::UserRepository;
