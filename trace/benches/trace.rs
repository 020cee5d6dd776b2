use criterion::{criterion_group, criterion_main, Criterion};

use lumen_trace::{SpanOptions, Tracer};

fn benchmark_start_span(c: &mut Criterion) {
    let tracer = Tracer::builder("bench")
        .with_sample_rate(0.0)
        .with_flush_interval(None)
        .build()
        .unwrap();
    let ctx = io_context::Context::background().freeze();
    c.bench_function("start_span", move |b| {
        b.iter(|| {
            let (_, span) = tracer.start_span(&ctx, "/foo", SpanOptions::new());
            span.end();
        })
    });
}

fn benchmark_sampled_span(c: &mut Criterion) {
    let tracer = Tracer::builder("bench")
        .with_flush_interval(None)
        .with_batch_size_threshold(usize::MAX)
        .build()
        .unwrap();
    c.bench_function("sampled_span", move |b| {
        b.iter(|| {
            let span = tracer.start("/foo", SpanOptions::new().with_attribute("http.method", "GET"));
            span.set_ok();
            span.end();
        })
    });
}

criterion_group!(benches, benchmark_start_span, benchmark_sampled_span);

criterion_main!(benches);
