//! Persistence layer: SQLite pool, schema, rows and repositories

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{DatabaseConnection, DatabasePool};
pub use error::DatabaseError;
