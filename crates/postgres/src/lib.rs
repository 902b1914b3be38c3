//! PostgreSQL tool provider: `execute-sql`, `list-tables`, `describe-table`
//! and `test-connection` served over MCP on stdio.

pub mod config;
pub mod db;
pub mod error;
pub mod tools;

pub use config::DatabaseConfig;
pub use db::Database;
pub use error::DatabaseError;
