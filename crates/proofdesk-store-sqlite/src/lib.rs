//! SQLite backend for the Proofdesk deliverable store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Every read-then-write sequence
//! runs inside an IMMEDIATE transaction, which serialises version-number
//! allocation and the open-request uniqueness check.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
