/*!
Package lumen_trace contains support for lightweight distributed tracing.

A trace is a tree of spans sharing one trace id. Spans are started by a
Tracer, propagated between processes with the W3C `traceparent` header, and
exported in batches to one or more exporters.

### Building a Tracer

A Tracer is built once at process start from the service identity, a sample
rate and the exporters that receive completed spans:

```rust
use std::time::Duration;
use lumen_trace::{ConsoleExporter, Tracer};

let tracer = Tracer::builder("checkout")
    .with_service_version("2.1.0")
    .with_sample_rate(0.25)
    .with_flush_interval(Some(Duration::from_secs(5)))
    .with_exporter(ConsoleExporter::new())
    .build()
    .unwrap();
```

When built inside a tokio runtime, the Tracer flushes on a timer. Completed
spans are also flushed when the buffer reaches the batch size threshold, and
once more on shutdown.

Be careful about sampling every trace in a production application with
significant traffic: a new trace will be started and exported for every
request.

### Adding Spans to a Trace

The current span is carried in an io_context::Context. A function that should
record its work in a span takes the Context as a parameter and hands the
returned child Context to the work it starts:

```rust
use lumen_trace::{SpanOptions, Tracer};

let tracer = Tracer::builder("checkout").with_flush_interval(None).build().unwrap();
let parent = io_context::Context::background().freeze();

let (ctx, span) = tracer.start_span(&parent, "example.com/Run", SpanOptions::new());
span.set_attribute("cart.items", 3);
span.end();
```

start_span will create a new top-level span if the context doesn't contain
another span, otherwise it will create a child span. Tracer::with_span wraps an
async block in a span and records its outcome.

### Crossing process boundaries

Tracer::inject_context writes the `traceparent` header for an outgoing request
and Tracer::extract_context reads it from an incoming one. The extracted
context is passed as the parent of the server span with SpanOptions::with_parent.
*/
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

mod basetypes;
mod config;
/// Io-context helpers for carrying the current trace
pub mod context;
mod console;
mod error;
mod export;
/// Process-wide tracer
pub mod global;
mod id_generator;
/// Trace propagation
pub mod propagation;
/// Span storage exporter
pub mod remote_store;
/// Trace sampling
pub mod sampling;
mod trace;
mod tracer;

pub use crate::basetypes::{AttributeValue, Attributes, SpanID, SpanKind, Status, TraceFlags, TraceID};
pub use crate::config::{Config, TracerBuilder};
pub use crate::console::ConsoleExporter;
pub use crate::context::TraceContext;
pub use crate::error::{ConfigError, ExportError};
pub use crate::export::{ExportResult, Exporter, InMemoryExporter, SpanData};
pub use crate::id_generator::{
    default_id_generator, generate_span_id, generate_trace_id, DefaultIDGenerator, IDGenerator,
};
pub use crate::remote_store::{RemoteStoreExporter, StoreClient};
pub use crate::trace::{Span, SpanOptions};
pub use crate::tracer::{FlushOutcome, Tracer};
