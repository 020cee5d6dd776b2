use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use futures_util::future::{self, BoxFuture};

use crate::basetypes::{Attributes, SpanKind, Status};
use crate::context::TraceContext;
use crate::error::ExportError;

/// Describes the result of an export.
pub type ExportResult = Result<(), ExportError>;

/// Exporter is a trait for sinks that receive batches of completed, sampled
/// spans.
///
/// A tracer never runs two exports over the same exporter concurrently, but
/// different exporters receive the same batch at the same time. Failures are
/// logged by the tracer and never reach the code that recorded the spans.
pub trait Exporter: fmt::Debug + Send + Sync {
    /// export delivers batch to the sink.
    fn export<'a>(&'a self, batch: &'a [SpanData]) -> BoxFuture<'a, ExportResult>;

    /// shutdown is called once, after the tracer's final flush.
    fn shutdown(&self) {}
}

/// SpanData contains all the information collected by a Span. It is the
/// frozen record produced when the span ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    /// context identifies the span within its trace.
    pub context: TraceContext,
    /// name of the span at the time it ended.
    pub name: String,
    /// kind of the span.
    pub kind: SpanKind,
    /// attributes recorded on the span, defaults first.
    pub attributes: Attributes,
    /// status is the outcome of the work.
    pub status: Status,
    /// start_time is when the span was started.
    pub start_time: SystemTime,
    /// end_time is when the span was ended.
    pub end_time: SystemTime,
}

impl SpanData {
    /// duration is the wall-clock time between start and end, zero if the
    /// clock went backwards.
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

/// InMemoryExporter keeps every exported span in memory.
///
/// Clones share the same storage, so a test can hand one clone to the tracer
/// and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    export_calls: Arc<AtomicUsize>,
    is_shutdown: Arc<AtomicBool>,
}

impl InMemoryExporter {
    /// new returns an empty exporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// finished_spans returns a copy of everything exported so far.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// export_calls counts the batches received.
    pub fn export_calls(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }

    /// is_shutdown reports whether the tracer has shut the exporter down.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// reset discards the stored spans and the call count.
    pub fn reset(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.export_calls.store(0, Ordering::SeqCst);
    }
}

impl Exporter for InMemoryExporter {
    fn export<'a>(&'a self, batch: &'a [SpanData]) -> BoxFuture<'a, ExportResult> {
        if self.is_shutdown() {
            return Box::pin(future::ready(Err(ExportError::Shutdown)));
        }
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Box::pin(future::ready(Ok(())))
    }

    fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}
