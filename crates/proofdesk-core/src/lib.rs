//! Core types and trait definitions for the Proofdesk deliverable store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod blob;
pub mod deliverable;
pub mod error;
pub mod feature;
pub mod revision;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
