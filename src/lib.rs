use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Shared connection pool for the SQLite side of the system (form schemas,
/// platform accounts, taxonomy, media ledger).
pub type DbPool = Pool<SqliteConnectionManager>;

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
