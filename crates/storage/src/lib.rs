#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{InMemoryStore, KeyValueStore, Mirror, MirrorError, MirrorKey};
pub use sqlite::{SqliteInitError, SqliteStore};
