#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Warehouse layout, engine sessions, and atomic artifact publishing.
//!
//! Every pipeline stage reads and writes Parquet artifacts under one
//! data-root directory tree (the warehouse). This crate owns that
//! layout, the embedded `DuckDB` session setup, partition discovery,
//! and the write-then-rename discipline that keeps partially written
//! artifacts invisible to idempotency checks.

pub mod discovery;
pub mod progress;
pub mod publish;
pub mod session;
pub mod warehouse;

pub use warehouse::Warehouse;

/// Errors that can occur while reading or writing warehouse artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded engine error.
    #[error("Engine error: {0}")]
    DuckDb(#[from] duckdb::Error),
}
