//! SQLite backends for Canvass.
//!
//! [`SqliteStore`] holds forms, rosters, credentials and the dispatch audit
//! log. [`SqliteQueue`] is the durable notification queue and lives in its own
//! database file so the two can fail independently. Both wrap
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod queue;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use queue::SqliteQueue;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
