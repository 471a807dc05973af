pub mod advisory_lock;
pub mod config_store;
pub mod connection;
pub mod error_context;
pub mod executor;

#[cfg(test)]
pub mod testing;

pub use config_store::{ConfigStore, DbConfigStore};
pub use executor::{Database, MySqlDatabase, Row};
