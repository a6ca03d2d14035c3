//! Statement tracing
//!
//! [`TracingExecutor`] wraps the executor a call runs against and writes every
//! statement to the mapper's trace sink before forwarding it. Tracing is off
//! until [`DbMap::trace_on`](super::dbmap::DbMap::trace_on) installs a sink.

use super::context::Context;
use super::database::{ExecResult, SqlExecutor};
use super::dbmap::DbMap;
use super::error::Result;
use super::value::{format_args, DatabaseResult, DatabaseRow, DatabaseValue};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::io::Write;
use std::sync::Arc;

/// Destination for trace lines
pub trait TraceSink: Send + Sync {
    /// Write one complete line
    fn write_line(&self, line: &str);
}

/// Trace sink that logs through `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn write_line(&self, line: &str) {
        tracing::debug!(target: "rust_dbmap::sql", "{}", line);
    }
}

/// Trace sink that writes lines to any `Write` implementation
///
/// Each line is written under a lock, so lines from concurrent calls never
/// interleave.
#[derive(Debug, Default)]
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Lock the underlying writer
    pub fn lock(&self) -> MutexGuard<'_, W> {
        self.writer.lock()
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> TraceSink for WriterSink<W> {
    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        // Sink failures are dropped.
        let _ = writeln!(writer, "{}", line).and_then(|_| writer.flush());
    }
}

/// Active trace configuration
#[derive(Clone)]
pub struct Tracer {
    prefix: String,
    sink: Arc<dyn TraceSink>,
}

impl Tracer {
    /// Create a tracer writing prefixed lines to `sink`
    pub fn new<S: Into<String>>(prefix: S, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
        }
    }

    /// Write a statement and its arguments
    pub fn trace(&self, query: &str, args: &[DatabaseValue]) {
        let line = if args.is_empty() {
            format!("{}{}", self.prefix, query)
        } else {
            format!("{}{} {}", self.prefix, query, format_args(args))
        };
        self.sink.write_line(&line);
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Executor decorator that traces every statement through the mapper
///
/// `E` is a plain connection or an open transaction.
pub struct TracingExecutor<'a, E: SqlExecutor + ?Sized> {
    dbmap: &'a DbMap,
    inner: &'a E,
}

impl<'a, E: SqlExecutor + ?Sized> TracingExecutor<'a, E> {
    /// Wrap `inner`, tracing through `dbmap`
    pub fn new(dbmap: &'a DbMap, inner: &'a E) -> Self {
        Self { dbmap, inner }
    }
}

#[async_trait]
impl<'a, E: SqlExecutor + ?Sized> SqlExecutor for TracingExecutor<'a, E> {
    async fn execute(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<ExecResult> {
        self.dbmap.trace(query, args);
        self.inner.execute(ctx, query, args).await
    }

    async fn fetch_one(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseRow> {
        self.dbmap.trace(query, args);
        self.inner.fetch_one(ctx, query, args).await
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        query: &str,
        args: &[DatabaseValue],
    ) -> Result<DatabaseResult> {
        self.dbmap.trace(query, args);
        self.inner.fetch_all(ctx, query, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracer_line_format() {
        let sink = Arc::new(WriterSink::new(Vec::new()));
        let tracer = Tracer::new("sql: ", sink.clone());

        tracer.trace("commit;", &[]);
        tracer.trace(
            "select * from \"person_test\" where \"id\" = ?",
            &[DatabaseValue::Long(1)],
        );

        let output = String::from_utf8(sink.lock().clone()).unwrap();
        assert_eq!(
            output,
            "sql: commit;\nsql: select * from \"person_test\" where \"id\" = ? [1]\n"
        );
    }

    #[test]
    fn test_log_sink_does_not_panic() {
        LogSink.write_line("select 1");
    }
}
