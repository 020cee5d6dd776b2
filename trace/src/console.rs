use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::{self, BoxFuture};

use crate::basetypes::Status;
use crate::error::ExportError;
use crate::export::{ExportResult, Exporter, SpanData};

/// ConsoleExporter writes a human-readable block per span, to stdout unless
/// another writer is given.
pub struct ConsoleExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    is_shutdown: AtomicBool,
}

impl ConsoleExporter {
    /// new writes to stdout.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// with_writer sends the output to writer instead of stdout.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        ConsoleExporter {
            writer: Mutex::new(Box::new(writer)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    fn write_batch(&self, batch: &[SpanData]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for span in batch {
            write_span(&mut *writer, span)?;
        }
        writer.flush()
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsoleExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsoleExporter")
    }
}

fn timestamp(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn write_span(w: &mut dyn Write, span: &SpanData) -> io::Result<()> {
    writeln!(w, "Span {:?}", span.name)?;
    writeln!(w, "\t TraceId: {}", span.context.trace_id)?;
    writeln!(w, "\t SpanId: {}", span.context.span_id)?;
    match span.context.parent_span_id {
        Some(parent) => writeln!(w, "\t ParentSpanId: {}", parent)?,
        None => writeln!(w, "\t ParentSpanId: none")?,
    }
    writeln!(w, "\t Kind: {}", span.kind)?;
    writeln!(w, "\t Start time: {}", timestamp(span.start_time))?;
    writeln!(w, "\t End time: {}", timestamp(span.end_time))?;
    writeln!(
        w,
        "\t Duration: {:.3}ms",
        span.duration().as_secs_f64() * 1000.0
    )?;
    match &span.status {
        Status::Error { description } => writeln!(w, "\t Status: error ({})", description)?,
        status => writeln!(w, "\t Status: {}", status.as_str())?,
    }
    if !span.attributes.is_empty() {
        writeln!(w, "\t Attributes:")?;
        for (key, value) in span.attributes.iter() {
            writeln!(w, "\t\t {}: {}", key, value)?;
        }
    }
    Ok(())
}

impl Exporter for ConsoleExporter {
    fn export<'a>(&'a self, batch: &'a [SpanData]) -> BoxFuture<'a, ExportResult> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(ExportError::Shutdown)));
        }
        let result = self.write_batch(batch).map_err(ExportError::from);
        Box::pin(future::ready(result))
    }

    fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use crate::basetypes::{Attributes, SpanID, SpanKind, TraceFlags, TraceID};
    use crate::context::TraceContext;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn checkout_span() -> SpanData {
        let start_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut attributes = Attributes::new();
        attributes.insert("service.name", "shop");
        attributes.insert("cart.items", 3);
        SpanData {
            context: TraceContext {
                trace_id: TraceID([0xab; 16]),
                span_id: SpanID([0xcd; 8]),
                parent_span_id: Some(SpanID([0x01; 8])),
                trace_flags: TraceFlags(1),
            },
            name: "checkout".to_string(),
            kind: SpanKind::Server,
            attributes,
            status: Status::Error {
                description: "card declined".to_string(),
            },
            start_time,
            end_time: start_time + Duration::from_millis(42),
        }
    }

    #[tokio::test]
    async fn writes_one_block_per_span() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(buffer.clone());

        exporter.export(&[checkout_span()]).await.unwrap();

        let want = "Span \"checkout\"\n\
                    \t TraceId: abababababababababababababababab\n\
                    \t SpanId: cdcdcdcdcdcdcdcd\n\
                    \t ParentSpanId: 0101010101010101\n\
                    \t Kind: server\n\
                    \t Start time: 2023-11-14T22:13:20.000000Z\n\
                    \t End time: 2023-11-14T22:13:20.042000Z\n\
                    \t Duration: 42.000ms\n\
                    \t Status: error (card declined)\n\
                    \t Attributes:\n\
                    \t\t service.name: shop\n\
                    \t\t cart.items: 3\n";
        assert_eq!(buffer.contents(), want);
    }

    #[tokio::test]
    async fn io_errors_are_reported() {
        let exporter = ConsoleExporter::with_writer(BrokenPipe);
        match exporter.export(&[checkout_span()]).await {
            Err(ExportError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn nothing_is_written_after_shutdown() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(buffer.clone());
        exporter.shutdown();

        assert!(matches!(
            exporter.export(&[checkout_span()]).await,
            Err(ExportError::Shutdown)
        ));
        assert!(buffer.contents().is_empty());
    }
}
