//! Native gateway: the thin seam between this crate and
//! `rusqlite`/`libsqlite3-sys`. Every other component reaches SQLite only
//! through here, so a future alternate driver only has to replace this file.

use std::path::Path;

use rusqlite::OpenFlags;

use crate::config::ConnectionOptions;
use crate::error::{Result, StoreError};

/// Bit-for-bit the open flags this crate ever needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    fn to_flags(self) -> OpenFlags {
        match self {
            OpenMode::ReadWriteCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        }
    }
}

/// Opens the native handle at `path` and applies the once-at-open ambient
/// PRAGMAs from `options`.
///
/// `SQLITE_OPEN_NO_MUTEX` is used throughout: this crate's `Connection` is
/// `Send` but not `Sync`, so SQLite's own internal mutex would
/// only add overhead never actually contended.
pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_with_flags(path, mode.to_flags())?;
    Ok(conn)
}

/// Opens a private, in-memory handle, used by tests and by callers with no
/// durability requirement.
pub fn open_in_memory() -> Result<rusqlite::Connection> {
    Ok(rusqlite::Connection::open_in_memory_with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Applies `options`'s ambient PRAGMAs to an already-open handle.
pub fn apply_options(conn: &rusqlite::Connection, options: &ConnectionOptions) -> Result<()> {
    conn.busy_timeout(options.busy_timeout)?;
    conn.pragma_update(None, "journal_mode", options.journal_mode.as_pragma_value())?;
    conn.pragma_update(None, "foreign_keys", if options.foreign_keys { 1 } else { 0 })?;
    Ok(())
}

/// Prepares `sql` against `conn`, translating a native prepare failure into
/// [`StoreError::Prepare`] with the offending SQL attached.
pub fn prepare<'c>(conn: &'c rusqlite::Connection, sql: &str) -> Result<rusqlite::Statement<'c>> {
    conn.prepare(sql).map_err(|e| prepare_error(e, sql))
}

pub(crate) fn prepare_error(err: rusqlite::Error, sql: &str) -> StoreError {
    StoreError::Prepare {
        code: sqlite_error_code(&err),
        message: err.to_string().into(),
        sql: sql.into(),
    }
}

pub(crate) fn step_error(err: rusqlite::Error, sql: &str) -> StoreError {
    if is_interrupted(&err) {
        return StoreError::Cancelled;
    }
    if is_busy(&err) {
        return StoreError::Busy { retries: 0 };
    }
    StoreError::Step {
        code: sqlite_error_code(&err),
        message: err.to_string().into(),
        sql: sql.into(),
    }
}

/// Extracts the raw SQLite result code from a `rusqlite::Error`, when one is
/// available (some variants, like type mismatches, don't carry one).
///
/// Column access uses [`column_bytes`]-after-`column_text` ordering hazard:
/// SQLite's `sqlite3_column_bytes` reports the length of whatever
/// representation was last requested, so a caller that reads a column's text
/// form and then its byte length (or vice versa) can silently observe a
/// stale length if it reorders those two calls. `rusqlite::Row::get` always
/// requests the target representation directly and never exposes raw
/// `column_bytes`, which sidesteps the hazard entirely; this gateway
/// deliberately never exposes `column_bytes` raw, for the same reason.
pub(crate) fn sqlite_error_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(code, _) => Some(code.extended_code),
        _ => None,
    }
}

/// Returns whether `err` represents `SQLITE_BUSY`.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

/// Returns whether `err` represents `SQLITE_INTERRUPT`, raised when
/// [`crate::connection::Connection::interrupt_handle`]'s handle fires mid-statement.
pub(crate) fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == rusqlite::ErrorCode::OperationInterrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_applies_options() {
        let conn = open_in_memory().unwrap();
        apply_options(&conn, &ConnectionOptions::default()).unwrap();
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        // in-memory databases cannot use WAL; SQLite silently falls back to `memory`.
        assert_eq!(mode, "memory");
    }

    #[test]
    fn prepare_error_carries_sql_text() {
        let conn = open_in_memory().unwrap();
        let err = prepare(&conn, "SELECT * FROM no_such_table").unwrap_err();
        match err {
            StoreError::Prepare { sql, .. } => assert_eq!(sql, "SELECT * FROM no_such_table"),
            other => panic!("expected Prepare, got {other:?}"),
        }
    }
}
