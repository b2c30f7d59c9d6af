//! Ambient tracing macros. The `tracing` feature gate lives inside each
//! macro body so call sites stay `#[cfg]`-free.

/// Emits a debug-level event for one prepared-statement execution.
#[macro_export]
macro_rules! store_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "litebase.query");
    };
}

/// Emits an info-level event for transaction/savepoint lifecycle.
#[macro_export]
macro_rules! store_trace_tx {
    ($event:literal, $depth:expr) => {
        #[cfg(feature = "tracing")]
        tracing::info!(event = $event, depth = $depth, "litebase.transaction");
    };
}

/// Emits a warn-level event when the schema synchronizer finds a live column
/// it cannot reconcile additively.
#[macro_export]
macro_rules! store_trace_schema_incompatible {
    ($table:expr, $detail:expr) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(table = %$table, detail = %$detail, "litebase.schema_incompatible");
    };
}
