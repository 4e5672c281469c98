pub mod connection;

pub use connection::SqliteUsageSource;
