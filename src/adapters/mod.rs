// Adapters layer: concrete implementations of the domain ports (database, passwords, cgi).

pub mod cgi;
pub mod password;
pub mod sqlite_store;

pub use password::BcryptHasher;
pub use sqlite_store::SqliteStore;
