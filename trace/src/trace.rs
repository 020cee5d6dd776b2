use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::basetypes::{AttributeValue, Attributes, SpanKind, Status};
use crate::context::TraceContext;
use crate::export::SpanData;
use crate::tracer::TracerInner;

/// Span records one unit of work. It has an associated TraceContext and
/// stores data accumulated while the span is active.
///
/// Spans are created by a Tracer. Clones refer to the same span, so a clone
/// can be handed to the code doing the work while the creator keeps another
/// to end it.
///
/// Ending freezes the span into a SpanData. Ending again returns the same
/// record and logs a warning once; recording calls on an ended span are
/// ignored.
#[derive(Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

struct SpanInner {
    context: TraceContext,
    state: Mutex<SpanState>,
    tracer: Weak<TracerInner>,
}

enum SpanState {
    Recording(Recording),
    Ended { data: SpanData, warned: bool },
}

struct Recording {
    name: String,
    kind: SpanKind,
    attributes: Attributes,
    status: Status,
    start_time: SystemTime,
}

impl Span {
    pub(crate) fn start(
        context: TraceContext,
        name: &str,
        kind: SpanKind,
        attributes: Attributes,
        tracer: Weak<TracerInner>,
    ) -> Self {
        let recording = Recording {
            name: name.to_string(),
            kind,
            attributes,
            status: Status::Unset,
            start_time: SystemTime::now(),
        };
        Span {
            inner: Arc::new(SpanInner {
                context,
                state: Mutex::new(SpanState::Recording(recording)),
                tracer,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SpanState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, f: impl FnOnce(&mut Recording)) {
        match &mut *self.state() {
            SpanState::Recording(recording) => f(recording),
            SpanState::Ended { .. } => {
                debug!(span_id = %self.inner.context.span_id, "ignoring update to ended span");
            }
        }
    }

    /// context gets a reference to the trace context of the span.
    pub fn context(&self) -> &TraceContext {
        &self.inner.context
    }

    /// update_name replaces the name of the span.
    pub fn update_name(&self, name: &str) {
        self.record(|r| r.name = name.to_string());
    }

    /// set_attribute sets key to value, replacing any previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        self.record(move |r| r.attributes.insert(key, value));
    }

    /// set_attributes merges attrs into the span's attributes.
    pub fn set_attributes<K, V>(&self, attrs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let attrs: Attributes = attrs.into_iter().collect();
        self.record(move |r| r.attributes.extend(attrs.iter().map(|(k, v)| (k, v.clone()))));
    }

    /// set_ok marks the work as successful.
    pub fn set_ok(&self) {
        self.set_status(Status::Ok);
    }

    /// set_error marks the work as failed with a human-readable description.
    pub fn set_error(&self, error: impl fmt::Display) {
        self.set_status(Status::Error {
            description: error.to_string(),
        });
    }

    /// record_error marks the work as failed, describing err and its chain of
    /// sources.
    pub fn record_error(&self, err: &(dyn Error + 'static)) {
        let mut description = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            description.push_str(": ");
            description.push_str(&cause.to_string());
            source = cause.source();
        }
        self.set_status(Status::Error { description });
    }

    fn set_status(&self, status: Status) {
        self.record(|r| {
            if r.status.is_unset() {
                r.status = status;
            }
        });
    }

    /// status returns the current status.
    pub fn status(&self) -> Status {
        match &*self.state() {
            SpanState::Recording(r) => r.status.clone(),
            SpanState::Ended { data, .. } => data.status.clone(),
        }
    }

    /// is_ended reports whether end has been called.
    pub fn is_ended(&self) -> bool {
        matches!(&*self.state(), SpanState::Ended { .. })
    }

    /// end stamps the end time, freezes the span, and hands the record to the
    /// tracer that started it.
    pub fn end(&self) -> SpanData {
        let data = {
            let mut state = self.state();
            match &mut *state {
                SpanState::Ended { data, warned } => {
                    if !*warned {
                        *warned = true;
                        warn!(span_id = %self.inner.context.span_id, name = %data.name, "span ended more than once");
                    }
                    return data.clone();
                }
                SpanState::Recording(recording) => {
                    let data = SpanData {
                        context: self.inner.context,
                        name: std::mem::take(&mut recording.name),
                        kind: recording.kind,
                        attributes: std::mem::take(&mut recording.attributes),
                        status: std::mem::take(&mut recording.status),
                        start_time: recording.start_time,
                        end_time: SystemTime::now(),
                    };
                    *state = SpanState::Ended {
                        data: data.clone(),
                        warned: false,
                    };
                    data
                }
            }
        };

        if let Some(tracer) = self.inner.tracer.upgrade() {
            tracer.finish(data.clone());
        }
        data
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state() {
            SpanState::Recording(r) => write!(f, "span {} {}", self.inner.context.span_id, r.name),
            SpanState::Ended { data, .. } => {
                write!(f, "span {} {}", self.inner.context.span_id, data.name)
            }
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("context", &self.inner.context)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// SpanOptions contains options concerning how a span is started.
#[derive(Clone, Debug, Default)]
pub struct SpanOptions {
    /// kind of the span, defaults to Internal.
    pub kind: SpanKind,
    /// parent overrides the parent found in the ambient context.
    pub parent: Option<TraceContext>,
    /// attributes recorded at start, after the tracer's default attributes.
    pub attributes: Attributes,
}

impl SpanOptions {
    /// new returns the default options: an internal span with no explicit parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// with_kind makes the span start with the given kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// with_parent makes the span a child of parent, typically a context
    /// extracted from an incoming request.
    pub fn with_parent(mut self, parent: TraceContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// with_attribute adds an attribute recorded at start.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    fn detached_span(name: &str) -> Span {
        Span::start(
            TraceContext::new_root(true),
            name,
            SpanKind::Internal,
            Attributes::new(),
            Weak::new(),
        )
    }

    #[test]
    fn end_freezes_recorded_data() {
        let span = detached_span("span0");
        span.set_attribute("key1", "value1");
        span.set_attributes(vec![("key2", 2), ("key1", 3)]);
        span.update_name("renamed");

        let data = span.end();
        assert_eq!(data.name, "renamed");
        assert_eq!(data.kind, SpanKind::Internal);
        assert_eq!(data.context, *span.context());
        assert_eq!(data.attributes.get("key1"), Some(&AttributeValue::Int(3)));
        assert_eq!(data.attributes.get("key2"), Some(&AttributeValue::Int(2)));
        assert!(data.end_time >= data.start_time);
        assert!(span.is_ended());

        span.set_attribute("late", true);
        span.update_name("too late");
        let again = span.end();
        assert_eq!(again, data);
    }

    #[test]
    fn repeated_end_keeps_first_end_time() {
        let span = detached_span("span0");
        let first = span.end();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = span.clone().end();
        assert_eq!(first.end_time, second.end_time);
    }

    #[test]
    fn status_is_final_once_set() {
        let span = detached_span("ok-first");
        span.set_ok();
        span.set_error("boom");
        assert_eq!(span.status(), Status::Ok);

        let span = detached_span("error-first");
        span.set_error("boom");
        span.set_ok();
        assert_eq!(
            span.end().status,
            Status::Error {
                description: "boom".to_string()
            }
        );
    }

    #[test]
    fn record_error_includes_sources() {
        #[derive(Debug)]
        struct Outer(io::Error);

        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("charge failed")
            }
        }

        impl Error for Outer {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                Some(&self.0)
            }
        }

        let span = detached_span("payment");
        let err = Outer(io::Error::new(io::ErrorKind::TimedOut, "gateway timed out"));
        span.record_error(&err);
        assert_eq!(
            span.status(),
            Status::Error {
                description: "charge failed: gateway timed out".to_string()
            }
        );
    }

    #[test]
    fn display_names_the_span() {
        let span = detached_span("checkout");
        assert_eq!(
            span.to_string(),
            format!("span {} checkout", span.context().span_id)
        );
    }

    #[test]
    fn options_builder() {
        let parent = TraceContext::new_root(true);
        let opts = SpanOptions::new()
            .with_kind(SpanKind::Client)
            .with_parent(parent)
            .with_attribute("http.method", "GET");
        assert_eq!(opts.kind, SpanKind::Client);
        assert_eq!(opts.parent, Some(parent));
        assert_eq!(
            opts.attributes.get("http.method"),
            Some(&AttributeValue::String("GET".to_string()))
        );
    }
}
