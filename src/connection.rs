//! Connection/session management: open/close, statement
//! execution, transactions via nested `SAVEPOINT`s, and resource discipline.

use std::path::Path;

use crate::config::ConnectionOptions;
use crate::error::{Result, StoreError};
use crate::gateway::{self, OpenMode};
use crate::statement::Statement;
use crate::value::BoundValue;
use crate::{store_trace_query, store_trace_tx};

/// A single-file SQLite connection plus the options governing value
/// conversion and ambient PRAGMAs.
///
/// `Connection` is `Send` (the underlying native handle can migrate between
/// threads) but intentionally not `Sync` — SQLite's own connection handle is
/// not safe to call concurrently from two threads even with a mutex-free
/// build, so this crate never implements `Sync` for it rather than leaning
/// on a lock to paper over that.
pub struct Connection {
    inner: rusqlite::Connection,
    options: ConnectionOptions,
    /// Ever-increasing counter used to name nested savepoints so a
    /// rolled-back inner transaction can never collide with an outer one
    /// still in flight.
    next_savepoint: u64,
}

impl Connection {
    /// Opens (creating if needed) the database file at `path` and applies
    /// `options`'s ambient PRAGMAs.
    pub fn open(path: impl AsRef<Path>, options: ConnectionOptions) -> Result<Self> {
        let inner = gateway::open(path, OpenMode::ReadWriteCreate)?;
        gateway::apply_options(&inner, &options)?;
        Ok(Connection {
            inner,
            options,
            next_savepoint: 0,
        })
    }

    /// Opens a private in-memory database, primarily for tests.
    pub fn open_in_memory(options: ConnectionOptions) -> Result<Self> {
        let inner = gateway::open_in_memory()?;
        gateway::apply_options(&inner, &options)?;
        Ok(Connection {
            inner,
            options,
            next_savepoint: 0,
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Prepares `sql` and binds `params` positionally, leaving the
    /// statement ready for the caller to drive with [`Statement::step`].
    pub fn query(&self, sql: &str, params: &[BoundValue]) -> Result<Statement<'_>> {
        store_trace_query!(sql, params.len());
        let mut stmt = Statement::prepare(&self.inner, sql)?;
        for (i, value) in params.iter().enumerate() {
            stmt.bind_by_index(i + 1, value)?;
        }
        Ok(stmt)
    }

    /// Executes `sql` to completion and returns the number of rows it
    /// affected. Uses SQLite's own native statement cache
    /// (`sqlite3_prepare_v2` + the connection's LRU of compiled statements)
    /// rather than a hand-rolled one, since `rusqlite::Connection` already
    /// provides this via `prepare_cached` and a second cache layered on top
    /// would just compete with it for the same slots.
    pub fn execute_nonquery(&self, sql: &str, params: &[BoundValue]) -> Result<usize> {
        store_trace_query!(sql, params.len());
        let mut stmt = self
            .inner
            .prepare_cached(sql)
            .map_err(|e| gateway::prepare_error(e, sql))?;
        let params: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
        stmt.execute(params.as_slice())
            .map_err(|e| map_execute_error(e, sql))
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    pub fn changes(&self) -> usize {
        self.inner.changes() as usize
    }

    /// Returns a handle that can interrupt a long-running query from
    /// another thread, backed directly by
    /// `rusqlite::InterruptHandle`.
    pub fn interrupt_handle(&self) -> rusqlite::InterruptHandle {
        self.inner.get_interrupt_handle()
    }

    /// Runs `body` inside a `SAVEPOINT`, releasing it on success and rolling
    /// back to it (then releasing) if `body` returns `Err`. Nested calls get their own, never-reused savepoint
    /// name, so an inner rollback cannot disturb an outer savepoint of the
    /// same connection.
    pub fn with_transaction<T>(&mut self, body: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let id = self.next_savepoint;
        self.next_savepoint += 1;
        let name = format!("litebase_sp_{id}");

        self.inner
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(|e| map_execute_error(e, "SAVEPOINT"))?;
        store_trace_tx!("begin", id);

        match body(self) {
            Ok(value) => {
                self.inner
                    .execute_batch(&format!("RELEASE {name}"))
                    .map_err(|e| map_execute_error(e, "RELEASE"))?;
                store_trace_tx!("commit", id);
                Ok(value)
            }
            Err(err) => {
                self.inner
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                    .map_err(|e| map_execute_error(e, "ROLLBACK TO"))?;
                store_trace_tx!("rollback", id);
                Err(err)
            }
        }
    }
}

fn map_execute_error(err: rusqlite::Error, sql: &str) -> StoreError {
    gateway::step_error(err, sql)
}
