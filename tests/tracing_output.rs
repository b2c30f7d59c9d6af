#![cfg(feature = "tracing")]

use std::io;
use std::sync::{Arc, Mutex};

use litebase::prelude::*;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct CapturingWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturingWriter {
    type Writer = CapturingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn query_execution_emits_a_tracing_event() {
    let buffer = CapturingWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        conn.execute_nonquery("CREATE TABLE t (a INTEGER)", &[]).unwrap();
    });

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("litebase.query"), "expected a query trace event, got: {output:?}");
}

#[test]
fn transaction_lifecycle_emits_begin_and_commit_events() {
    let buffer = CapturingWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut conn = Connection::open_in_memory(ConnectionOptions::default()).unwrap();
        conn.execute_nonquery("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        conn.with_transaction(|tx| tx.execute_nonquery("INSERT INTO t VALUES (1)", &[]).map(|_| ()))
            .unwrap();
    });

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("litebase.transaction"), "expected a transaction trace event, got: {output:?}");
    assert!(output.contains("event=\"begin\""), "expected the begin event, got: {output:?}");
    assert!(output.contains("event=\"commit\""), "expected the commit event, got: {output:?}");
}
