//! Error taxonomy for the persistence layer.
//!
//! A flat enum, one variant per distinct failure kind, distinct from the
//! native SQLite result codes which are carried as context rather than
//! surfaced directly. Native errors are converted at the gateway boundary
//! (see [`crate::gateway`]) and never leak a raw [`rusqlite::Error`] past it
//! except through the `#[from]` conversion below.

use compact_str::CompactString;
use thiserror::Error;

/// Errors produced by any layer of the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A statement failed to prepare.
    #[error("prepare failed ({code:?}): {message} (sql: {sql})")]
    Prepare {
        code: Option<i32>,
        message: CompactString,
        sql: CompactString,
    },

    /// A bind call failed.
    #[error("bind failed for parameter {param}: {message}")]
    Bind {
        param: CompactString,
        message: CompactString,
    },

    /// A `step` call returned an error code other than `ROW`/`DONE`.
    #[error("step failed ({code:?}): {message} (sql: {sql})")]
    Step {
        code: Option<i32>,
        message: CompactString,
        sql: CompactString,
    },

    /// A column extraction failed.
    #[error("column access failed for {column}: {message}")]
    Column {
        column: CompactString,
        message: CompactString,
    },

    /// `BindByName` referenced a parameter not present in the statement.
    #[error("unknown bind parameter: {0}")]
    UnknownParameter(CompactString),

    /// Materialization referenced a column not present in the result set.
    #[error("unknown column: {0}")]
    UnknownColumn(CompactString),

    /// No converter is registered in the [`crate::value::ValueRegistry`] for a host type.
    #[error("no converter registered for type: {0}")]
    BindNotSupported(CompactString),

    /// The predicate translator encountered a node kind it does not handle.
    #[error("cannot translate expression node: {0}")]
    UntranslatableExpression(CompactString),

    /// The schema synchronizer cannot reconcile the live schema with the
    /// table descriptor (a column type changed, or a column was dropped).
    #[error("schema incompatible: {0}")]
    SchemaIncompatible(CompactString),

    /// The handle (statement or connection) was already finalized/closed.
    #[error("use of a disposed handle")]
    Disposed,

    /// An `Interrupt()` was observed during execution.
    #[error("operation cancelled")]
    Cancelled,

    /// The busy-timeout expired while waiting for a file lock.
    #[error("database busy after {retries} retries")]
    Busy { retries: u32 },

    /// Catch-all for native errors that don't carry enough context to be
    /// classified above (I/O errors opening/closing the database file).
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
