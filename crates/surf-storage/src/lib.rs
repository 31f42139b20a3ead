//! Surf Storage Layer
//!
//! SQLite-backed durable stores for the browser shell. Two stores share this
//! layer: the session topology store and the local credential store. All
//! multi-row writes go through [`Database::transaction`].

mod database;
mod error;
mod migrations;

pub use database::{read_meta, write_meta, Database, StoreKind};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
