//! Embedded `DuckDB` session setup.
//!
//! Every stage opens a fresh in-memory session; all state lives in the
//! Parquet artifacts, never in the engine.

use duckdb::Connection;
use toll_audit_config::EngineConfig;

use crate::StoreError;

/// Opens an in-memory engine session with the configured resource caps.
///
/// The memory ceiling is always applied; the thread cap only when
/// configured (the engine otherwise uses every available core).
///
/// # Errors
///
/// Returns [`StoreError`] if the connection or session setup fails.
pub fn open_session(engine: &EngineConfig) -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;

    conn.execute_batch(&format!("SET memory_limit = '{}';", engine.memory_limit))?;

    if let Some(threads) = engine.threads {
        conn.execute_batch(&format!("SET threads = {threads};"))?;
    }

    Ok(conn)
}
