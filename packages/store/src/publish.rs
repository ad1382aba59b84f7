//! Atomic Parquet publishing.
//!
//! Artifacts are written to a `.tmp` sibling and renamed into place on
//! success. Idempotency checks test destination-path existence, so a
//! crash mid-write can never make a partial artifact look complete.

use std::path::{Path, PathBuf};

use duckdb::Connection;

use crate::StoreError;

/// Compression applied to a published Parquet artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParquetCompression {
    /// ZSTD, used for partition outputs.
    Zstd,
    /// Snappy, used for the small datamart aggregates.
    Snappy,
}

impl ParquetCompression {
    /// The `COPY` options clause for this compression.
    #[must_use]
    pub const fn copy_options(self) -> &'static str {
        match self {
            Self::Zstd => "FORMAT PARQUET, COMPRESSION ZSTD",
            Self::Snappy => "FORMAT PARQUET, COMPRESSION SNAPPY",
        }
    }
}

/// The staging sibling an artifact is written to before the rename.
#[must_use]
pub fn stage_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push_str(".tmp");
    dest.with_file_name(name)
}

/// Runs `COPY (select_sql) TO dest` through the staging path, renaming
/// into place on success. A failed copy removes the staging file.
///
/// # Errors
///
/// Returns [`StoreError`] if the copy or the rename fails.
pub fn copy_to_parquet(
    conn: &Connection,
    select_sql: &str,
    dest: &Path,
    compression: ParquetCompression,
) -> Result<(), StoreError> {
    let staged = stage_path(dest);
    let copy_sql = format!(
        "COPY ({select_sql}) TO '{}' ({})",
        staged.display(),
        compression.copy_options(),
    );

    if let Err(e) = conn.execute_batch(&copy_sql) {
        let _ = std::fs::remove_file(&staged);
        return Err(StoreError::DuckDb(e));
    }

    std::fs::rename(&staged, dest)?;

    Ok(())
}

/// Counts the rows of a published Parquet artifact.
///
/// # Errors
///
/// Returns [`StoreError`] if the artifact cannot be scanned.
pub fn parquet_row_count(conn: &Connection, path: &Path) -> Result<u64, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT COUNT(*) FROM read_parquet('{}')",
        path.display()
    ))?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Writes raw bytes through the staging path, renaming into place on
/// success.
///
/// # Errors
///
/// Returns [`StoreError`] if the write or the rename fails.
pub fn write_bytes_atomic(dest: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let staged = stage_path(dest);

    if let Err(e) = std::fs::write(&staged, contents) {
        let _ = std::fs::remove_file(&staged);
        return Err(StoreError::Io(e));
    }

    std::fs::rename(&staged, dest)?;

    Ok(())
}
