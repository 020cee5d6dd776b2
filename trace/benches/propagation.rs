use criterion::{criterion_group, criterion_main, Criterion};

use lumen_trace::propagation::{format_traceparent, parse_traceparent};
use lumen_trace::{SpanID, TraceContext, TraceFlags, TraceID};

fn benchmark_format_traceparent(c: &mut Criterion) {
    let trace_context = TraceContext {
        trace_id: TraceID([
            0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d,
            0x4e, 0x4f,
        ]),
        span_id: SpanID([0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68]),
        parent_span_id: None,
        trace_flags: TraceFlags(1),
    };

    c.bench_function("format_traceparent", move |b| {
        b.iter(|| format_traceparent(&trace_context))
    });
}

fn benchmark_parse_traceparent(c: &mut Criterion) {
    let header = "00-404142434445464748494a4b4c4d4e4f-6162636465666768-01";

    c.bench_function("parse_traceparent", move |b| {
        b.iter(|| parse_traceparent(header))
    });
}

criterion_group!(
    benches,
    benchmark_format_traceparent,
    benchmark_parse_traceparent
);

criterion_main!(benches);
