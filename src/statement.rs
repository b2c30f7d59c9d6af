//! Prepared-statement lifecycle: an explicit `Prepared -> Bound ->
//! Row/Done -> Finalized` state machine over `rusqlite::Statement`, since
//! `rusqlite` itself allows stepping/binding in orders SQLite would reject
//! and only reports the misuse as a runtime error.

use std::collections::HashMap;

use compact_str::CompactString;

use crate::error::{Result, StoreError};
use crate::gateway;
use crate::value::{BoundValue, SqlValue};

/// Where a statement sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Freshly prepared or freshly reset; no bindings applied yet this pass.
    Prepared,
    /// At least one parameter has been bound since the last prepare/reset.
    Bound,
    /// `step` has returned a row; `column_value` is valid until the next
    /// `step`/`reset`.
    Row,
    /// `step` has returned no more rows; only `reset` is valid.
    Done,
    /// `finalize`/`dispose` has been called; every other call errors.
    Finalized,
}

/// Outcome of one [`Statement::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

/// A prepared statement bound to a single connection, tracked through its
/// state machine so misuse (stepping a finalized statement, reading a
/// column outside `Row` state) is rejected in this crate rather than
/// surfacing as an opaque SQLite error.
pub struct Statement<'conn> {
    inner: rusqlite::Statement<'conn>,
    sql: CompactString,
    state: State,
    /// Lazily built, case-insensitive column-name -> index map.
    column_index: Option<HashMap<String, usize>>,
    /// The current row, extracted eagerly by `step` rather than kept as a
    /// live `rusqlite::Row` — a `Row` borrows the `Statement` it came from,
    /// which would make this type self-referential if held across calls.
    current_row: Option<Vec<SqlValue>>,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn prepare(conn: &'conn rusqlite::Connection, sql: &str) -> Result<Self> {
        let inner = gateway::prepare(conn, sql)?;
        Ok(Statement {
            inner,
            sql: sql.into(),
            state: State::Prepared,
            column_index: None,
            current_row: None,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        self.inner
            .column_name(index)
            .map_err(|e| gateway::prepare_error(e, &self.sql))
    }

    /// Case-insensitive column-name lookup, building the index on first use.
    pub fn column_index_of(&mut self, name: &str) -> Result<usize> {
        if self.column_index.is_none() {
            let mut map = HashMap::with_capacity(self.inner.column_count());
            for i in 0..self.inner.column_count() {
                let col_name = self
                    .inner
                    .column_name(i)
                    .map_err(|e| gateway::prepare_error(e, &self.sql))?;
                map.insert(col_name.to_ascii_lowercase(), i);
            }
            self.column_index = Some(map);
        }
        self.column_index
            .as_ref()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| StoreError::UnknownColumn(name.into()))
    }

    fn ensure_not_finalized(&self) -> Result<()> {
        if self.state == State::Finalized {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    /// Binds a 1-based parameter index.
    pub fn bind_by_index(&mut self, index: usize, value: &BoundValue) -> Result<()> {
        self.ensure_not_finalized()?;
        self.inner
            .raw_bind_parameter(index, value)
            .map_err(|e| StoreError::Bind {
                param: CompactString::from(index.to_string()),
                message: e.to_string().into(),
            })?;
        self.state = State::Bound;
        Ok(())
    }

    /// Binds a named parameter (`:name`, `@name`, or `$name`), returning
    /// [`StoreError::UnknownParameter`] if `sql` declared no such name.
    pub fn bind_by_name(&mut self, name: &str, value: &BoundValue) -> Result<()> {
        self.ensure_not_finalized()?;
        let index = self
            .inner
            .parameter_index(name)
            .map_err(|e| StoreError::Bind {
                param: name.into(),
                message: e.to_string().into(),
            })?
            .ok_or_else(|| StoreError::UnknownParameter(name.into()))?;
        self.bind_by_index(index, value)
    }

    /// Advances the statement one row. Calling `step` again
    /// after `Done` is a no-op that returns `Done` once more, matching
    /// SQLite's own `sqlite3_step` behavior. The row's columns are
    /// extracted eagerly into `current_row` so `column_value` needs no
    /// further borrow of the underlying statement.
    pub fn step(&mut self) -> Result<StepResult> {
        self.ensure_not_finalized()?;
        if self.state == State::Done {
            return Ok(StepResult::Done);
        }
        let column_count = self.inner.column_count();
        let stepped = {
            let mut rows = self.inner.raw_query();
            rows.next().map_err(|e| gateway::step_error(e, &self.sql))?.map(|row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(sql_value_from_ref))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
        };
        match stepped {
            Some(Ok(values)) => {
                self.current_row = Some(values);
                self.state = State::Row;
                Ok(StepResult::Row)
            }
            Some(Err(e)) => Err(gateway::step_error(e, &self.sql)),
            None => {
                self.current_row = None;
                self.state = State::Done;
                Ok(StepResult::Done)
            }
        }
    }

    /// Reads column `index` from the current row. Errors if
    /// called outside `Row` state — callers are expected to only call this
    /// between a `step` that returned [`StepResult::Row`] and the next
    /// `step`/`reset`.
    pub fn column_value(&self, index: usize) -> Result<SqlValue> {
        let row = self.current_row.as_ref().ok_or_else(|| StoreError::Column {
            column: CompactString::from(index.to_string()),
            message: "column_value called outside of Row state".into(),
        })?;
        row.get(index).cloned().ok_or_else(|| StoreError::Column {
            column: CompactString::from(index.to_string()),
            message: "column index out of range".into(),
        })
    }

    /// Resets the statement for re-execution, keeping current bindings.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_not_finalized()?;
        self.inner.raw_query().reset();
        self.current_row = None;
        self.state = State::Prepared;
        Ok(())
    }

    /// Clears every bound parameter back to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        self.ensure_not_finalized()?;
        self.inner
            .clear_bindings();
        self.state = State::Prepared;
        Ok(())
    }

    /// Finalizes the statement early. Dropping a `Statement` finalizes it
    /// implicitly, so this is only needed when a caller wants the native
    /// resources released before the handle goes out of scope.
    pub fn dispose(mut self) {
        self.state = State::Finalized;
    }
}

fn sql_value_from_ref(value: rusqlite::types::ValueRef<'_>) -> SqlValue {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

/// Convenience used by [`crate::connection::Connection::execute_nonquery`]
/// to bind a positional parameter list in one pass.
pub(crate) fn bind_all(stmt: &mut Statement<'_>, params: &[BoundValue]) -> Result<()> {
    for (i, value) in params.iter().enumerate() {
        stmt.bind_by_index(i + 1, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::open_in_memory;

    #[test]
    fn steps_through_rows_and_reports_done() {
        let conn = open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        let mut stmt = Statement::prepare(&conn, "SELECT a FROM t ORDER BY a").unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.column_value(0).unwrap(), SqlValue::Integer(1));
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.column_value(0).unwrap(), SqlValue::Integer(2));
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
    }

    #[test]
    fn column_index_lookup_is_case_insensitive() {
        let conn = open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (FirstName TEXT);").unwrap();
        let mut stmt = Statement::prepare(&conn, "SELECT FirstName FROM t").unwrap();
        assert_eq!(stmt.column_index_of("firstname").unwrap(), 0);
        assert!(stmt.column_index_of("nope").is_err());
    }

    #[test]
    fn bind_by_name_rejects_unknown_parameter() {
        let conn = open_in_memory().unwrap();
        let mut stmt = Statement::prepare(&conn, "SELECT :a").unwrap();
        let err = stmt.bind_by_name("b", &BoundValue::Int64(1)).unwrap_err();
        assert!(matches!(err, StoreError::UnknownParameter(_)));
    }
}
