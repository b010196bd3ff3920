//! Database backend for the generator store.
//!
//! The store is a SQLite file opened in WAL mode so that the monitoring
//! stack can read while a pipeline writes.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/accelerations.db").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::SqlitePool;
