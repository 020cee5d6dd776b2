use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{join_all, FutureExt};
use io_context::Context;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::basetypes::{Attributes, SpanID};
use crate::config::{Config, TracerBuilder};
use crate::context::{self, TraceContext};
use crate::export::{Exporter, SpanData};
use crate::id_generator::IDGenerator;
use crate::propagation::{self, Extractor, Injector};
use crate::sampling::{Sampler, SamplingParameters};
use crate::trace::{Span, SpanOptions};

/// Tracer creates spans, resolves their parents, makes sampling decisions,
/// and batches completed spans for export.
///
/// A Tracer is cheap to clone; clones share all state. There is no ambient
/// "current span": the parent of a new span is either given explicitly in
/// SpanOptions or read from the io_context::Context passed down the caller's
/// request.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

pub(crate) struct TracerInner {
    config: Config,
    default_attributes: Attributes,
    sampler: Sampler,
    id_generator: Arc<dyn IDGenerator + Send + Sync>,
    exporters: Vec<Arc<dyn Exporter>>,
    active_spans: Mutex<HashMap<SpanID, Span>>,
    completed_spans: Mutex<Vec<SpanData>>,
    // held for the whole export so flushes never overlap
    flush_lock: tokio::sync::Mutex<()>,
    flush_scheduled: AtomicBool,
    flusher: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

/// FlushOutcome summarises one flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// spans is the size of the exported batch.
    pub spans: usize,
    /// exporters is the number of exporters called.
    pub exporters: usize,
    /// failed_exporters counts exporters that returned an error or panicked.
    pub failed_exporters: usize,
}

impl FlushOutcome {
    /// is_success reports whether every exporter accepted the batch.
    pub fn is_success(&self) -> bool {
        self.failed_exporters == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl TracerInner {
    fn active_spans(&self) -> MutexGuard<'_, HashMap<SpanID, Span>> {
        lock(&self.active_spans)
    }

    fn completed_spans(&self) -> MutexGuard<'_, Vec<SpanData>> {
        lock(&self.completed_spans)
    }

    /// finish is called by Span::end with the frozen record.
    pub(crate) fn finish(self: &Arc<Self>, data: SpanData) {
        let span_id = data.context.span_id;
        if self.active_spans().remove(&span_id).is_none() {
            debug!(span_id = %span_id, "ended span was not active");
        }
        if !data.context.is_sampled() {
            tracing::trace!(span_id = %span_id, "span not sampled");
            return;
        }

        let buffered = {
            // shutdown sets the flag under this lock, so a span is either
            // buffered before the final flush or dropped
            let mut completed = self.completed_spans();
            if self.is_shutdown.load(Ordering::SeqCst) {
                debug!(span_id = %span_id, name = %data.name, "tracer is shut down, dropping span");
                return;
            }
            completed.push(data);
            completed.len()
        };
        if buffered >= self.config.batch_size_threshold {
            self.schedule_flush();
        }
    }

    fn schedule_flush(self: &Arc<Self>) {
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                debug!("batch size threshold reached, scheduling flush");
                let scheduled = ScheduledFlush(Arc::clone(self));
                handle.spawn(async move {
                    let tracer = Tracer {
                        inner: Arc::clone(&scheduled.0),
                    };
                    tracer.flush().await;
                    drop(scheduled);
                });
            }
            Err(_) => {
                // flushed by the next explicit or periodic flush instead
                self.flush_scheduled.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// ScheduledFlush clears the scheduled flag when the flush task finishes or is
/// dropped unpolled along with its runtime.
struct ScheduledFlush(Arc<TracerInner>);

impl Drop for ScheduledFlush {
    fn drop(&mut self) {
        self.0.flush_scheduled.store(false, Ordering::SeqCst);
    }
}

async fn periodic_flush(tracer: Weak<TracerInner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let inner = match tracer.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        Tracer { inner }.flush().await;
    }
    debug!("periodic flush stopped");
}

impl Tracer {
    /// builder starts configuring a tracer for service_name.
    pub fn builder(service_name: impl Into<String>) -> TracerBuilder {
        TracerBuilder::from_config(Config::new(service_name))
    }

    pub(crate) fn from_parts(
        config: Config,
        exporters: Vec<Arc<dyn Exporter>>,
        id_generator: Arc<dyn IDGenerator + Send + Sync>,
        sampler: Sampler,
    ) -> Self {
        let mut default_attributes = Attributes::new();
        default_attributes.insert("service.name", config.service_name.as_str());
        default_attributes.insert("service.version", config.service_version.as_str());
        default_attributes.insert("service.environment", config.environment.as_str());

        let flush_interval = config.flush_interval();
        let inner = Arc::new(TracerInner {
            config,
            default_attributes,
            sampler,
            id_generator,
            exporters,
            active_spans: Mutex::new(HashMap::new()),
            completed_spans: Mutex::new(Vec::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_scheduled: AtomicBool::new(false),
            flusher: Mutex::new(None),
            is_shutdown: AtomicBool::new(false),
        });

        if let Some(period) = flush_interval {
            match Handle::try_current() {
                Ok(handle) => {
                    debug!(period_ms = period.as_millis() as u64, "starting periodic flush");
                    let task = handle.spawn(periodic_flush(Arc::downgrade(&inner), period));
                    *lock(&inner.flusher) = Some(task);
                }
                Err(_) => {
                    debug!("no tokio runtime, periodic flush disabled");
                }
            }
        }

        Tracer { inner }
    }

    /// config returns the configuration the tracer was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// start_span starts a span in ctx with a name and options.
    ///
    /// The parent is `options.parent` if set, otherwise the trace context
    /// carried by ctx, otherwise the span starts a new trace. The returned
    /// Context carries the new span's trace context; pass it to the work the
    /// span covers so nested spans parent onto it.
    pub fn start_span(
        &self,
        ctx: &Arc<Context>,
        name: &str,
        mut options: SpanOptions,
    ) -> (Context, Span) {
        if options.parent.is_none() {
            options.parent = context::current(ctx).copied();
        }
        let span = self.start(name, options);
        let child = context::with_trace_context(ctx, *span.context());
        (child, span)
    }

    /// start starts a span without an ambient context: the parent is
    /// `options.parent` or none.
    pub fn start(&self, name: &str, options: SpanOptions) -> Span {
        let inner = &self.inner;
        let SpanOptions {
            kind,
            parent,
            attributes,
        } = options;

        let trace_context = match parent {
            None => {
                let mut root = TraceContext::new_root_with(&*inner.id_generator, false);
                let decision = (inner.sampler)(SamplingParameters {
                    parent_context: None,
                    trace_id: &root.trace_id,
                    name,
                });
                root.set_sampled(decision.sample);
                root
            }
            Some(parent) => {
                let mut child = parent.child_with(&*inner.id_generator);
                if !parent.is_sampled() && inner.config.resample_unsampled_parents {
                    let decision = (inner.sampler)(SamplingParameters {
                        parent_context: Some(&parent),
                        trace_id: &parent.trace_id,
                        name,
                    });
                    child.set_sampled(decision.sample);
                }
                child
            }
        };

        let mut span_attributes = inner.default_attributes.clone();
        span_attributes.extend(attributes);

        let span = Span::start(
            trace_context,
            name,
            kind,
            span_attributes,
            Arc::downgrade(inner),
        );
        if !inner.is_shutdown.load(Ordering::SeqCst) {
            inner
                .active_spans()
                .insert(trace_context.span_id, span.clone());
        }
        span
    }

    /// with_span runs f inside a new span.
    ///
    /// f receives the span and the Context to pass to nested work. The span's
    /// status is set to ok when f returns Ok and to error when it returns Err
    /// or panics; the span is then ended exactly once. f's result, error or
    /// panic reaches the caller unchanged.
    ///
    /// A status f sets itself is final: if f calls `set_ok` and then returns
    /// Err, the span stays ok.
    pub async fn with_span<F, Fut, T, E>(
        &self,
        ctx: &Arc<Context>,
        name: &str,
        options: SpanOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Arc<Context>, Span) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let (child, span) = self.start_span(ctx, name, options);
        let work_span = span.clone();
        let outcome = AssertUnwindSafe(async move { f(child.freeze(), work_span).await })
            .catch_unwind()
            .await;
        Self::complete(&span, outcome)
    }

    /// in_span is the synchronous form of with_span.
    pub fn in_span<F, T, E>(
        &self,
        ctx: &Arc<Context>,
        name: &str,
        options: SpanOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Arc<Context>, Span) -> Result<T, E>,
        E: fmt::Display,
    {
        let (child, span) = self.start_span(ctx, name, options);
        let work_span = span.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || f(child.freeze(), work_span)));
        Self::complete(&span, outcome)
    }

    fn complete<T, E: fmt::Display>(
        span: &Span,
        outcome: std::thread::Result<Result<T, E>>,
    ) -> Result<T, E> {
        match outcome {
            Ok(Ok(value)) => {
                span.set_ok();
                span.end();
                Ok(value)
            }
            Ok(Err(err)) => {
                span.set_error(&err);
                span.end();
                Err(err)
            }
            Err(payload) => {
                span.set_error(format!("panicked: {}", panic_message(&*payload)));
                span.end();
                panic::resume_unwind(payload)
            }
        }
    }

    /// extract_context reads the traceparent header. Missing or malformed
    /// headers yield None, in which case the request should start a new trace.
    pub fn extract_context(&self, headers: &dyn Extractor) -> Option<TraceContext> {
        propagation::extract(headers)
    }

    /// inject_context writes the trace context carried by ctx into headers.
    /// Nothing is written when ctx carries no trace.
    pub fn inject_context(&self, ctx: &Context, headers: &mut dyn Injector) {
        if let Some(trace_context) = context::current(ctx) {
            propagation::inject(trace_context, headers);
        }
    }

    /// flush exports every buffered span.
    ///
    /// The buffer is swapped out in one step, then every exporter receives the
    /// batch concurrently. Exporter failures are logged and counted, never
    /// returned. Flushes are serialized: a flush started while another runs
    /// waits for it and then exports whatever has been buffered since.
    pub async fn flush(&self) -> FlushOutcome {
        let _guard = self.inner.flush_lock.lock().await;
        let batch = {
            let mut completed = self.inner.completed_spans();
            std::mem::take(&mut *completed)
        };
        self.inner.flush_scheduled.store(false, Ordering::SeqCst);
        if batch.is_empty() {
            return FlushOutcome::default();
        }

        let exporters = &self.inner.exporters;
        let results = join_all(exporters.iter().map(|exporter| {
            let batch = &batch;
            AssertUnwindSafe(async move { exporter.export(batch).await }).catch_unwind()
        }))
        .await;

        let mut outcome = FlushOutcome {
            spans: batch.len(),
            exporters: exporters.len(),
            failed_exporters: 0,
        };
        for (exporter, result) in exporters.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    outcome.failed_exporters += 1;
                    error!(exporter = ?exporter, spans = batch.len(), error = %err, "failed to export spans");
                }
                Err(payload) => {
                    outcome.failed_exporters += 1;
                    error!(exporter = ?exporter, spans = batch.len(), error = %panic_message(&*payload), "exporter panicked");
                }
            }
        }
        outcome
    }

    /// shutdown stops the periodic flush, performs a final flush, and shuts
    /// the exporters down. Spans ended afterwards are dropped; calling
    /// shutdown again does nothing.
    pub async fn shutdown(&self) -> FlushOutcome {
        let already_shut_down = {
            let _completed = self.inner.completed_spans();
            self.inner.is_shutdown.swap(true, Ordering::SeqCst)
        };
        if already_shut_down {
            debug!("tracer already shut down");
            return FlushOutcome::default();
        }

        {
            // a periodic flush in progress keeps its batch: wait for it to
            // finish before stopping the task
            let _flushing = self.inner.flush_lock.lock().await;
            if let Some(task) = lock(&self.inner.flusher).take() {
                task.abort();
            }
        }

        let leaked = self.inner.active_spans().len();
        if leaked > 0 {
            warn!(spans = leaked, "shutting down with spans that were never ended");
        }

        let outcome = self.flush().await;
        for exporter in &self.inner.exporters {
            exporter.shutdown();
        }
        outcome
    }

    /// is_shutdown reports whether shutdown has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::SeqCst)
    }

    /// active_span_count is the number of started spans not yet ended.
    pub fn active_span_count(&self) -> usize {
        self.inner.active_spans().len()
    }

    /// buffered_span_count is the number of completed spans awaiting export.
    pub fn buffered_span_count(&self) -> usize {
        self.inner.completed_spans().len()
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.inner.config)
            .field("exporters", &self.inner.exporters)
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}
